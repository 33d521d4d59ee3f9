//! Single-shot reachability probes
//!
//! A probe answers two questions at once: is the address reachable, and how
//! long did the round trip take. Both are folded into one `Option<f64>`:
//!
//! ```text
//! None          → unreachable (timeout, non-zero exit, spawn error)
//! Some(0.0)     → reachable, but no round-trip time in the output
//! Some(latency) → reachable, measured round-trip time in milliseconds
//! ```

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, trace};

/// Issues one reachability probe to one address
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `address` once; never retries and never fails.
    async fn probe(&self, address: &str, timeout: Duration) -> Option<f64>;
}

/// Matches `time=0.045 ms`, `time=12ms` and Windows' `time<1ms`
static LATENCY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)time\s*[=<]\s*([0-9]+(?:[.,][0-9]+)?)\s*ms").expect("valid latency regex")
});

/// Extract the round-trip time in milliseconds from `ping` output.
pub fn parse_latency(output: &str) -> Option<f64> {
    let captures = LATENCY_PATTERN.captures(output)?;
    captures[1].replace(',', ".").parse().ok()
}

/// Prober shelling out to the platform `ping` binary
#[derive(Debug, Clone)]
pub struct SystemPingProber {
    program: String,
}

impl Default for SystemPingProber {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
        }
    }
}

impl SystemPingProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable with the same command line as `ping`
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, address: &str, timeout: Duration) -> Command {
        let mut command = Command::new(&self.program);

        if cfg!(windows) {
            command
                .arg("-n")
                .arg("1")
                .arg("-w")
                .arg(timeout.as_millis().max(1).to_string());
        } else {
            command
                .arg("-c")
                .arg("1")
                .arg("-W")
                .arg(timeout.as_secs().max(1).to_string());
        }

        command
            .arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        command
    }
}

#[async_trait]
impl Prober for SystemPingProber {
    async fn probe(&self, address: &str, timeout: Duration) -> Option<f64> {
        let output = match tokio::time::timeout(timeout, self.command(address, timeout).output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!("{address}: could not run {}: {e}", self.program);
                return None;
            }
            Err(_) => {
                debug!("{address}: ping timed out after {timeout:?}");
                return None;
            }
        };

        if !output.status.success() {
            trace!("{address}: ping exited with {}", output.status);
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let latency = parse_latency(&stdout).unwrap_or(0.0);
        trace!("{address}: reachable in {latency}ms");

        Some(latency)
    }
}
