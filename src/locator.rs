//! Read side of supervision: which process matches a title, port, or pid.

use std::fmt;

use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::scanner::{ProcessLister, ProcessRecord};
use crate::title;

/// How a stop or find invocation addresses its process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisionTarget {
    Port(u16),
    Pid(u32),
    Title(String),
}

impl SupervisionTarget {
    /// Picks the addressing mode from raw CLI values.
    ///
    /// Modes are considered in the order port, pid, title; the first one
    /// supplied with a usable value wins. A supplied but unparsable value is
    /// logged and the next mode is considered.
    pub fn select(
        port: Option<&str>,
        pid: Option<&str>,
        title: Option<&str>,
        logger: &Logger,
    ) -> Option<Self> {
        if let Some(raw) = port.filter(|v| !v.trim().is_empty()) {
            match raw.trim().parse::<u16>() {
                Ok(port) => return Some(SupervisionTarget::Port(port)),
                Err(_) => logger.error(format!("port must be a number from 0 to 65535 \u{2192} {}", raw)),
            }
        }
        if let Some(raw) = pid.filter(|v| !v.trim().is_empty()) {
            match raw.trim().parse::<u32>() {
                Ok(pid) if pid > 0 => return Some(SupervisionTarget::Pid(pid)),
                _ => logger.error(format!("pid must be a positive number \u{2192} {}", raw)),
            }
        }
        title
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|title| SupervisionTarget::Title(title.to_string()))
    }

    /// Mode name used in log lines.
    pub fn mode(&self) -> &'static str {
        match self {
            SupervisionTarget::Port(_) => "port",
            SupervisionTarget::Pid(_) => "pid",
            SupervisionTarget::Title(_) => "title",
        }
    }
}

impl fmt::Display for SupervisionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisionTarget::Port(port) => write!(f, "port \u{2192} {}", port),
            SupervisionTarget::Pid(pid) => write!(f, "pid \u{2192} {}", pid),
            SupervisionTarget::Title(title) => write!(f, "title \u{2192} {}", title),
        }
    }
}

pub struct ProcessLocator<L> {
    lister: L,
    logger: Logger,
}

impl<L: ProcessLister> ProcessLocator<L> {
    pub fn new(lister: L, logger: Logger) -> Self {
        Self { lister, logger }
    }

    /// Processes whose marker equals `title` exactly.
    pub async fn find_by_title(&self, title: &str) -> Result<Vec<ProcessRecord>> {
        let records = self.lister.scan().await?;
        self.logger
            .debug(format!("scanned {} runtime processes", records.len()));
        Ok(records
            .into_iter()
            .filter(|record| title::has_title(&record.command_line, title))
            .collect())
    }

    /// Pid listening on `port`. Unbound ports are `Ok(None)`.
    pub async fn find_by_port(&self, port: u16) -> Result<Option<u32>> {
        self.lister.pid_on_port(port).await
    }

    /// The live process with `pid`, if it exists.
    pub async fn find_by_pid(&self, pid: u32) -> Result<Option<ProcessRecord>> {
        self.lister.lookup_pid(pid).await
    }

    /// Resolves a target to pids, in discovery order. No match is `NotFound`.
    pub async fn resolve(&self, target: &SupervisionTarget) -> Result<Vec<u32>> {
        let pids: Vec<u32> = match target {
            SupervisionTarget::Port(port) => self.find_by_port(*port).await?.into_iter().collect(),
            SupervisionTarget::Pid(pid) => self
                .find_by_pid(*pid)
                .await?
                .map(|record| record.pid)
                .into_iter()
                .collect(),
            SupervisionTarget::Title(title) => self
                .find_by_title(title)
                .await?
                .into_iter()
                .map(|r| r.pid)
                .collect(),
        };
        if pids.is_empty() {
            return Err(Error::NotFound(format!("no process found by {}", target)));
        }
        Ok(pids)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;

    /// In-memory process table.
    #[derive(Debug, Clone, Default)]
    pub struct FakeLister {
        pub records: Vec<ProcessRecord>,
        pub ports: Vec<(u16, u32)>,
        pub port_lookup_fails: bool,
    }

    impl FakeLister {
        pub fn with(records: &[(u32, &str)]) -> Self {
            Self {
                records: records
                    .iter()
                    .map(|(pid, cmd)| ProcessRecord {
                        pid: *pid,
                        command_line: cmd.to_string(),
                    })
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl ProcessLister for FakeLister {
        async fn scan(&self) -> Result<Vec<ProcessRecord>> {
            Ok(self.records.clone())
        }

        async fn pid_on_port(&self, port: u16) -> Result<Option<u32>> {
            if self.port_lookup_fails {
                return Err(Error::lookup("lsof", "permission denied"));
            }
            Ok(self
                .ports
                .iter()
                .find(|(p, _)| *p == port)
                .map(|(_, pid)| *pid))
        }

        async fn lookup_pid(&self, pid: u32) -> Result<Option<ProcessRecord>> {
            Ok(self.records.iter().find(|r| r.pid == pid).cloned())
        }
    }

    fn locator(lister: FakeLister) -> ProcessLocator<FakeLister> {
        ProcessLocator::new(lister, Logger::new("test"))
    }

    #[tokio::test]
    async fn find_by_title_keeps_exact_matches() {
        let locator = locator(FakeLister::with(&[
            (10, "node a.mjs --title=x"),
            (11, "node b.mjs --title=xy"),
            (12, "node c.mjs"),
            (13, "node d.mjs --title=x --port 3000"),
        ]));
        let pids: Vec<u32> = locator
            .find_by_title("x")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.pid)
            .collect();
        assert_eq!(pids, vec![10, 13]);
    }

    #[tokio::test]
    async fn find_by_port_distinguishes_unbound_from_failure() {
        let mut lister = FakeLister::default();
        lister.ports.push((3000, 42));
        let found = locator(lister.clone());
        assert_eq!(found.find_by_port(3000).await.unwrap(), Some(42));
        assert_eq!(found.find_by_port(3001).await.unwrap(), None);

        lister.port_lookup_fails = true;
        assert!(locator(lister).find_by_port(3000).await.is_err());
    }

    #[tokio::test]
    async fn resolve_reports_not_found() {
        let locator = locator(FakeLister::with(&[(7, "node server.mjs --title=web")]));
        let err = locator
            .resolve(&SupervisionTarget::Title("nitro-proxy".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(
            locator
                .resolve(&SupervisionTarget::Title("web".into()))
                .await
                .unwrap(),
            vec![7]
        );
        assert!(locator.resolve(&SupervisionTarget::Port(80)).await.is_err());
    }

    #[test]
    fn select_prefers_port_then_pid_then_title() {
        let logger = Logger::new("test");
        assert_eq!(
            SupervisionTarget::select(Some("3000"), Some("12"), Some("x"), &logger),
            Some(SupervisionTarget::Port(3000))
        );
        assert_eq!(
            SupervisionTarget::select(None, Some("12"), Some("x"), &logger),
            Some(SupervisionTarget::Pid(12))
        );
        assert_eq!(
            SupervisionTarget::select(None, None, Some(" x "), &logger),
            Some(SupervisionTarget::Title("x".into()))
        );
        assert_eq!(SupervisionTarget::select(None, None, Some(""), &logger), None);
    }

    #[test]
    fn select_falls_through_unparsable_values() {
        let logger = Logger::new("test");
        assert_eq!(
            SupervisionTarget::select(Some("abc"), None, Some("nitro-proxy"), &logger),
            Some(SupervisionTarget::Title("nitro-proxy".into()))
        );
        assert_eq!(
            SupervisionTarget::select(Some("70000"), Some("0"), None, &logger),
            None
        );
    }

    #[tokio::test]
    async fn find_by_pid_reports_liveness() {
        let locator = locator(FakeLister::with(&[(7, "node server.mjs")]));
        assert_eq!(
            locator.find_by_pid(7).await.unwrap().map(|r| r.command_line),
            Some("node server.mjs".to_string())
        );
        assert_eq!(locator.find_by_pid(8).await.unwrap(), None);
    }
}
