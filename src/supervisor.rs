//! Write side of supervision: spawning servers and terminating them.
//!
//! Spawns are either attached (inherit the console, block until exit) or
//! detached (streams discarded, own session, outlive this process). Stops
//! resolve their target through the `ProcessLocator` and force-kill.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::Stdio;

#[cfg(unix)]
use sysinfo::{ProcessesToUpdate, System};
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::locator::{ProcessLocator, SupervisionTarget};
use crate::logger::Logger;
use crate::process::{LaunchSpec, ServerState};
use crate::scanner::ProcessLister;

/// Hidden subcommand through which the relay launcher is invoked.
pub const RELAY_SUBCOMMAND: &str = "relay";

/// How a detached process is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachStrategy {
    /// Spawn the target itself in a new session.
    Direct,
    /// Spawn `launcher relay -- <target>` detached; the launcher runs the
    /// target with its own (discarded) streams and waits for it.
    ///
    /// Used on Windows only, where detaching `.cmd` shims directly loses the
    /// child. It is a platform workaround, nothing more.
    Relay { launcher: PathBuf },
}

impl DetachStrategy {
    pub fn detect() -> Self {
        if cfg!(windows) {
            match std::env::current_exe() {
                Ok(launcher) => DetachStrategy::Relay { launcher },
                Err(_) => DetachStrategy::Direct,
            }
        } else {
            DetachStrategy::Direct
        }
    }

    /// The command actually handed to the OS.
    pub fn wrap(&self, spec: &LaunchSpec) -> LaunchSpec {
        match self {
            DetachStrategy::Direct => spec.clone(),
            DetachStrategy::Relay { launcher } => {
                let mut args = vec![RELAY_SUBCOMMAND.to_string(), "--".to_string()];
                args.push(spec.program.clone());
                args.extend(spec.args.iter().cloned());
                LaunchSpec {
                    program: launcher.to_string_lossy().into_owned(),
                    args,
                    cwd: spec.cwd.clone(),
                    env: spec.env.clone(),
                }
            }
        }
    }
}

/// Forcible process termination.
#[allow(async_fn_in_trait)]
pub trait Terminator {
    /// Kills `pid`, and with `tree` all of its descendants first.
    async fn kill(&self, pid: u32, tree: bool) -> Result<()>;
}

/// Terminates through the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsTerminator;

impl Terminator for OsTerminator {
    async fn kill(&self, pid: u32, tree: bool) -> Result<()> {
        os_kill(pid, tree).await
    }
}

/// A pid that could not be terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillFailure {
    pub pid: u32,
    pub reason: String,
}

/// Result of one stop invocation. Never an error past the command boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped {
        pids: Vec<u32>,
        failures: Vec<KillFailure>,
    },
    NotFound(String),
    LookupFailed(String),
}

pub struct ProcessSupervisor<L, T = OsTerminator> {
    locator: ProcessLocator<L>,
    terminator: T,
    detach: DetachStrategy,
    logger: Logger,
}

impl<L: ProcessLister, T: Terminator> ProcessSupervisor<L, T> {
    pub fn new(
        locator: ProcessLocator<L>,
        terminator: T,
        detach: DetachStrategy,
        logger: Logger,
    ) -> Self {
        Self {
            locator,
            terminator,
            detach,
            logger,
        }
    }

    pub fn locator(&self) -> &ProcessLocator<L> {
        &self.locator
    }

    #[cfg(test)]
    pub fn terminator(&self) -> &T {
        &self.terminator
    }

    /// Runs `spec` to completion on the current console; returns its exit code.
    pub async fn spawn_attached(&self, spec: &LaunchSpec) -> Result<i32> {
        self.transition(ServerState::NotStarted, ServerState::Starting, spec);
        let code = run_attached(spec).await?;
        self.transition(ServerState::Running, ServerState::exited(code), spec);
        Ok(code)
    }

    /// Starts `spec` in the background and returns its pid without waiting.
    pub fn spawn_detached(&self, spec: &LaunchSpec) -> Result<u32> {
        self.transition(ServerState::NotStarted, ServerState::Starting, spec);
        let launched = self.detach.wrap(spec);
        let mut command = std::process::Command::new(&launched.program);
        command
            .args(&launched.args)
            .envs(launched.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(cwd) = &launched.cwd {
            command.current_dir(cwd);
        }
        detach_from_parent(&mut command);

        let child = command
            .spawn()
            .map_err(|err| Error::spawn(&spec.program, err))?;
        let pid = child.id();
        // Dropping the handle neither waits for nor kills the child.
        drop(child);
        self.transition(ServerState::Starting, ServerState::Running, spec);
        self.logger.debug(format!("detached pid {}", pid));
        Ok(pid)
    }

    /// Resolves `target` and force-kills what it finds.
    ///
    /// With `tree` only the first match is killed, together with its
    /// descendants. Several managed servers can share a title, and killing
    /// every one of their trees is a decision left to the caller. Without
    /// `tree` every match is killed on its own.
    pub async fn stop(&self, target: &SupervisionTarget, tree: bool) -> StopOutcome {
        let mut candidates = match self.locator.resolve(target).await {
            Ok(pids) => pids,
            Err(Error::NotFound(message)) => return StopOutcome::NotFound(message),
            Err(err) => return StopOutcome::LookupFailed(err.to_string()),
        };
        if tree {
            candidates.truncate(1);
        }

        let mut pids = Vec::new();
        let mut failures = Vec::new();
        for pid in candidates {
            self.logger.debug(format!(
                "{:?} \u{2192} {:?} pid {}",
                ServerState::Running,
                ServerState::Stopping,
                pid
            ));
            match self.terminator.kill(pid, tree).await {
                Ok(()) => pids.push(pid),
                Err(err) => failures.push(KillFailure {
                    pid,
                    reason: err.to_string(),
                }),
            }
        }
        StopOutcome::Stopped { pids, failures }
    }

    fn transition(&self, from: ServerState, to: ServerState, spec: &LaunchSpec) {
        self.logger
            .debug(format!("{:?} \u{2192} {:?}: {}", from, to, spec.display()));
    }
}

/// Runs `spec` with inherited streams and waits for it.
///
/// An interrupt reaches the child through the shared console; this process
/// keeps waiting so the child's own exit code is what gets reported.
pub async fn run_attached(spec: &LaunchSpec) -> Result<i32> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    let mut child = command
        .spawn()
        .map_err(|err| Error::spawn(&spec.program, err))?;

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = tokio::signal::ctrl_c() => child.wait().await?,
    };
    Ok(status.code().unwrap_or(1))
}

#[cfg(unix)]
fn detach_from_parent(command: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        command.pre_exec(|| {
            let _ = libc::setsid();
            Ok(())
        });
    }
}

#[cfg(windows)]
fn detach_from_parent(command: &mut std::process::Command) {
    use std::os::windows::process::CommandExt;
    use windows_sys::Win32::System::Threading::{
        CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW, DETACHED_PROCESS,
    };
    command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
}

#[cfg(not(any(unix, windows)))]
fn detach_from_parent(_command: &mut std::process::Command) {}

#[cfg(unix)]
async fn os_kill(pid: u32, tree: bool) -> Result<()> {
    let root = to_signal_pid(pid)?;
    // Snapshot before the root dies; its children get reparented afterwards.
    let order = if tree {
        kill_order(pid, &parent_table())
    } else {
        vec![pid]
    };
    send_kill(root).map_err(|err| Error::lookup("kill", format!("pid {}: {}", pid, err)))?;
    for child in order.into_iter().skip(1) {
        if let Ok(child) = to_signal_pid(child) {
            // Children may exit on their own while we walk the tree.
            let _ = send_kill(child);
        }
    }
    Ok(())
}

#[cfg(unix)]
fn to_signal_pid(pid: u32) -> Result<i32> {
    // 0 and negative values address process groups.
    match i32::try_from(pid) {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(Error::lookup("kill", format!("invalid pid {}", pid))),
    }
}

#[cfg(unix)]
fn send_kill(pid: i32) -> std::io::Result<()> {
    let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(windows)]
async fn os_kill(pid: u32, tree: bool) -> Result<()> {
    let pid_arg = pid.to_string();
    let mut args = vec!["/F", "/PID", pid_arg.as_str()];
    if tree {
        args.push("/T");
    }
    let output = crate::scanner::capture("taskkill", &args).await?;
    if output.success {
        Ok(())
    } else {
        Err(Error::lookup("taskkill", output.stderr.trim()))
    }
}

#[cfg(not(any(unix, windows)))]
async fn os_kill(pid: u32, _tree: bool) -> Result<()> {
    Err(Error::lookup("kill", format!("cannot terminate pid {} on this platform", pid)))
}

/// `(pid, ppid)` pairs of every process in a fresh snapshot.
#[cfg(unix)]
fn parent_table() -> Vec<(u32, u32)> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
        .processes()
        .iter()
        .filter_map(|(pid, process)| {
            process
                .parent()
                .map(|parent| (pid.as_u32(), parent.as_u32()))
        })
        .collect()
}

/// `root` followed by its descendants, parents before children.
#[cfg_attr(not(unix), allow(dead_code))]
fn kill_order(root: u32, table: &[(u32, u32)]) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, ppid) in table {
        if pid != ppid {
            children.entry(*ppid).or_default().push(*pid);
        }
    }

    let mut order = vec![root];
    let mut seen = HashSet::from([root]);
    let mut next = 0;
    while next < order.len() {
        let parent = order[next];
        next += 1;
        for child in children.get(&parent).into_iter().flatten() {
            if seen.insert(*child) {
                order.push(*child);
            }
        }
    }
    order
}
