//! Vendor-CLI secret source.
//!
//! Some vendors only expose tokens through their own CLI ("tool auth
//! print-token"). Non-zero exit, empty output, a missing binary, or a
//! timeout all mean "not found" here; a broken vendor tool must never sink
//! the discovery pass.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::core::cli_runner::{self, CLI_TIMEOUT};

use super::{DiscoveredSecret, SecretSource};

const LABEL: &str = "CLI Tool";

/// Reads a token from a vendor CLI that prints it to stdout.
pub struct CliTokenSource {
    provider_id: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CliTokenSource {
    #[must_use]
    pub fn new(
        provider_id: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            program: program.into(),
            args,
            timeout: CLI_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the vendor binary is on PATH at all.
    #[must_use]
    pub fn tool_installed(&self) -> bool {
        which::which(&self.program).is_ok()
    }
}

#[async_trait]
impl SecretSource for CliTokenSource {
    fn label(&self) -> &str {
        LABEL
    }

    async fn discover(&self) -> Vec<DiscoveredSecret> {
        if !self.tool_installed() {
            return Vec::new();
        }

        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        match cli_runner::run_command(&self.program, &args, self.timeout).await {
            Ok(output) if output.success() => {
                let token = output.stdout.trim();
                if token.is_empty() {
                    Vec::new()
                } else {
                    vec![DiscoveredSecret::new(&self.provider_id, token, LABEL)]
                }
            }
            Ok(output) => {
                debug!(
                    program = %self.program,
                    exit_code = output.exit_code,
                    "vendor CLI exited non-zero, treating as not found"
                );
                Vec::new()
            }
            Err(e) => {
                debug!(program = %self.program, error = %e, "vendor CLI failed, treating as not found");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_not_found() {
        let source = CliTokenSource::new("codex", "quotawatch-no-such-tool", vec![]);
        assert!(source.discover().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn token_on_stdout_is_discovered() {
        let source = CliTokenSource::new(
            "codex",
            "sh",
            vec!["-c".to_string(), "echo '  tok-42  '".to_string()],
        );
        let found = source.discover().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].secret, "tok-42");
        assert_eq!(found[0].provider_id, "codex");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_not_found() {
        let source = CliTokenSource::new(
            "codex",
            "sh",
            vec!["-c".to_string(), "echo oops >&2; exit 1".to_string()],
        );
        assert!(source.discover().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_output_is_not_found() {
        let source = CliTokenSource::new("codex", "sh", vec!["-c".to_string(), "true".to_string()]);
        assert!(source.discover().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_is_not_found() {
        let source = CliTokenSource::new("codex", "sleep", vec!["30".to_string()])
            .with_timeout(Duration::from_millis(100));
        assert!(source.discover().await.is_empty());
    }
}
