//! OS process listing.
//!
//! Each platform gets its own `ProcessLister`: the listing commands and the
//! column order of their output differ, so the line parsers differ too. The
//! lister is chosen once at startup by `PlatformLister::detect`.

use std::process::Stdio;

use regex::Regex;
use tokio::process::Command;

use crate::error::{Error, Result};

/// A process as seen in one listing snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub command_line: String,
}

/// Read-only access to the OS process table and port bindings.
#[allow(async_fn_in_trait)]
pub trait ProcessLister {
    /// Lists processes running the configured runtime. An unavailable or
    /// silent listing facility yields an empty list.
    async fn scan(&self) -> Result<Vec<ProcessRecord>>;

    /// Pid of the process listening on `port`, if any.
    async fn pid_on_port(&self, port: u16) -> Result<Option<u32>>;

    /// The live process with `pid`, regardless of runtime.
    async fn lookup_pid(&self, pid: u32) -> Result<Option<ProcessRecord>>;
}

/// Lists processes with `ps`, `lsof`.
#[derive(Debug, Clone)]
pub struct PosixProcessLister {
    runtime: String,
    line: Regex,
}

/// Lists processes with `wmic`, `netstat`.
#[derive(Debug, Clone)]
pub struct WindowsProcessLister {
    runtime: String,
    line: Regex,
}

/// The lister for the platform this binary runs on.
#[derive(Debug, Clone)]
pub enum PlatformLister {
    Posix(PosixProcessLister),
    Windows(WindowsProcessLister),
}

impl PlatformLister {
    pub fn detect(runtime: &str) -> Self {
        if cfg!(windows) {
            PlatformLister::Windows(WindowsProcessLister::new(runtime))
        } else {
            PlatformLister::Posix(PosixProcessLister::new(runtime))
        }
    }
}

impl ProcessLister for PlatformLister {
    async fn scan(&self) -> Result<Vec<ProcessRecord>> {
        match self {
            PlatformLister::Posix(lister) => lister.scan().await,
            PlatformLister::Windows(lister) => lister.scan().await,
        }
    }

    async fn pid_on_port(&self, port: u16) -> Result<Option<u32>> {
        match self {
            PlatformLister::Posix(lister) => lister.pid_on_port(port).await,
            PlatformLister::Windows(lister) => lister.pid_on_port(port).await,
        }
    }

    async fn lookup_pid(&self, pid: u32) -> Result<Option<ProcessRecord>> {
        match self {
            PlatformLister::Posix(lister) => lister.lookup_pid(pid).await,
            PlatformLister::Windows(lister) => lister.lookup_pid(pid).await,
        }
    }
}

impl PosixProcessLister {
    pub fn new(runtime: &str) -> Self {
        Self {
            runtime: runtime.to_string(),
            // pid first, then the full argument list
            line: Regex::new(r"^\s*(\d+)\s+(.*)").expect("valid ps line regex"),
        }
    }

    pub fn parse_line(&self, line: &str) -> Option<ProcessRecord> {
        let captures = self.line.captures(line)?;
        Some(ProcessRecord {
            pid: captures[1].parse().ok()?,
            command_line: captures[2].trim_end().to_string(),
        })
    }

    pub fn parse_listing(&self, stdout: &str) -> Vec<ProcessRecord> {
        stdout
            .lines()
            .filter(|line| is_runtime_line(line, &self.runtime))
            .filter_map(|line| self.parse_line(line))
            .collect()
    }
}

impl ProcessLister for PosixProcessLister {
    async fn scan(&self) -> Result<Vec<ProcessRecord>> {
        // `command` and `cmd` are aliases of `args` that POSIX does not define.
        let stdout = match capture("ps", &["-wweo", "pid,args"]).await {
            Ok(output) => output.stdout,
            Err(_) => return Ok(Vec::new()),
        };
        Ok(self.parse_listing(&stdout))
    }

    async fn pid_on_port(&self, port: u16) -> Result<Option<u32>> {
        let filter = format!("-iTCP:{}", port);
        let output = capture("lsof", &["-nP", &filter, "-sTCP:LISTEN", "-t"]).await?;
        // lsof exits 1 with no output when nothing matches.
        if !output.success && !output.stderr.trim().is_empty() {
            return Err(Error::lookup("lsof", output.stderr.trim()));
        }
        Ok(output
            .stdout
            .lines()
            .find_map(|line| line.trim().parse::<u32>().ok()))
    }

    async fn lookup_pid(&self, pid: u32) -> Result<Option<ProcessRecord>> {
        let pid_arg = pid.to_string();
        let output = capture("ps", &["-o", "pid=,args=", "-p", &pid_arg]).await?;
        Ok(output.stdout.lines().find_map(|line| self.parse_line(line)))
    }
}

impl WindowsProcessLister {
    pub fn new(runtime: &str) -> Self {
        Self {
            runtime: runtime.to_string(),
            // command line first, pid in the last column
            line: Regex::new(r"^(.*)\s+(\d+)\s*$").expect("valid wmic line regex"),
        }
    }

    pub fn parse_line(&self, line: &str) -> Option<ProcessRecord> {
        let captures = self.line.captures(line)?;
        Some(ProcessRecord {
            pid: captures[2].parse().ok()?,
            command_line: captures[1].trim().to_string(),
        })
    }

    pub fn parse_listing(&self, stdout: &str) -> Vec<ProcessRecord> {
        stdout
            .lines()
            .filter(|line| is_runtime_line(line, &self.runtime))
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    fn image_name(&self) -> String {
        if self.runtime.to_lowercase().ends_with(".exe") {
            self.runtime.clone()
        } else {
            format!("{}.exe", self.runtime)
        }
    }
}

impl ProcessLister for WindowsProcessLister {
    async fn scan(&self) -> Result<Vec<ProcessRecord>> {
        let filter = format!("Name = '{}'", self.image_name());
        let args = [
            "Path",
            "win32_process",
            "Where",
            filter.as_str(),
            "Get",
            "CommandLine,ProcessId",
        ];
        let stdout = match capture("wmic", &args).await {
            Ok(output) => output.stdout,
            Err(_) => return Ok(Vec::new()),
        };
        Ok(self.parse_listing(&stdout))
    }

    async fn pid_on_port(&self, port: u16) -> Result<Option<u32>> {
        let output = capture("netstat", &["-ano", "-p", "TCP"]).await?;
        if !output.success {
            return Err(Error::lookup("netstat", output.stderr.trim()));
        }
        Ok(parse_netstat(&output.stdout, port))
    }

    async fn lookup_pid(&self, pid: u32) -> Result<Option<ProcessRecord>> {
        let filter = format!("ProcessId = {}", pid);
        let args = [
            "Path",
            "win32_process",
            "Where",
            filter.as_str(),
            "Get",
            "CommandLine,ProcessId",
        ];
        let output = capture("wmic", &args).await?;
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| self.parse_line(line))
            .find(|record| record.pid == pid))
    }
}

// Drops shell wrappers and anything not running the runtime.
fn is_runtime_line(line: &str, runtime: &str) -> bool {
    !line.trim().is_empty() && !line.contains("/bin/sh") && line.contains(runtime)
}

/// Finds the pid owning a LISTENING TCP socket on `port` in `netstat -ano` output.
pub fn parse_netstat(stdout: &str, port: u16) -> Option<u32> {
    let suffix = format!(":{}", port);
    stdout.lines().find_map(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        match cols.as_slice() {
            [proto, local, _remote, state, pid]
                if proto.eq_ignore_ascii_case("TCP")
                    && local.ends_with(&suffix)
                    && state.eq_ignore_ascii_case("LISTENING") =>
            {
                pid.parse().ok()
            }
            _ => None,
        }
    })
}

/// Output of a finished listing command.
#[derive(Debug, Clone)]
pub struct Captured {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program` to completion and captures its output.
pub async fn capture(program: &str, args: &[&str]) -> Result<Captured> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| Error::lookup(program, err.to_string()))?;
    Ok(Captured {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
