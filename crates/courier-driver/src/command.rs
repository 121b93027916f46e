// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`CommandDriver`]: one child process per driver session.
//!
//! The child is launched with the profile and proxy on its argument list
//! and then exchanges one JSON line per send over stdin/stdout. Timeouts
//! are enforced by the worker around each send; this module only enforces
//! an exit bound on close.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::DriverConfig;
use courier_core::{CourierError, Driver, DriverSession, Outcome, ProfileRecord};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::wire::{SendRequest, SendResponse};

/// How long a closing child gets to exit before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Launches the configured automation command once per session.
pub struct CommandDriver {
    config: DriverConfig,
}

impl CommandDriver {
    pub fn new(config: DriverConfig) -> Result<Self, CourierError> {
        if config.command.trim().is_empty() {
            return Err(CourierError::Config(
                "driver.command must be set to run workers".to_string(),
            ));
        }
        Ok(Self { config })
    }
}

#[async_trait]
impl Driver for CommandDriver {
    async fn open(
        &self,
        profile: &ProfileRecord,
        proxy_url: &str,
    ) -> Result<Box<dyn DriverSession>, CourierError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .arg("--profile-id")
            .arg(&profile.profile_id)
            .arg("--proxy")
            .arg(proxy_url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| CourierError::Driver {
            message: format!("failed to launch `{}`", self.config.command),
            source: Some(Box::new(e)),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            CourierError::driver("automation command has no stdin pipe")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            CourierError::driver("automation command has no stdout pipe")
        })?;

        debug!(
            command = self.config.command.as_str(),
            profile = profile.profile_id.as_str(),
            "automation command launched"
        );
        Ok(Box::new(CommandSession {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        }))
    }
}

/// A live child process speaking the JSON wire.
pub struct CommandSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

#[async_trait]
impl DriverSession for CommandSession {
    async fn send(&mut self, chat_ref: &str, text: &str) -> Result<Outcome, CourierError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            CourierError::driver("driver session already closed")
        })?;

        let mut line = serde_json::to_string(&SendRequest { chat_ref, text })
            .map_err(|e| CourierError::Driver {
                message: "failed to encode send request".to_string(),
                source: Some(Box::new(e)),
            })?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| CourierError::Driver {
                message: "automation command stdin is closed".to_string(),
                source: Some(Box::new(e)),
            })?;
        stdin.flush().await.map_err(|e| CourierError::Driver {
            message: "failed to flush automation command stdin".to_string(),
            source: Some(Box::new(e)),
        })?;

        let mut response_line = String::new();
        let read = self
            .stdout
            .read_line(&mut response_line)
            .await
            .map_err(|e| CourierError::Driver {
                message: "failed to read automation command stdout".to_string(),
                source: Some(Box::new(e)),
            })?;
        if read == 0 {
            return Err(CourierError::driver(
                "automation command closed its stdout mid-session",
            ));
        }

        let response: SendResponse =
            serde_json::from_str(response_line.trim()).map_err(|e| CourierError::Driver {
                message: format!("malformed driver response: {}", response_line.trim()),
                source: Some(Box::new(e)),
            })?;
        if let Some(detail) = &response.detail {
            debug!(detail = detail.as_str(), "driver detail");
        }
        Ok(response.into_outcome())
    }

    async fn close(&mut self) -> Result<(), CourierError> {
        // EOF on stdin is the shutdown signal for the child.
        drop(self.stdin.take());
        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(code = status.code(), "automation command exited");
                Ok(())
            }
            Ok(Err(e)) => Err(CourierError::Driver {
                message: "failed waiting for automation command".to_string(),
                source: Some(Box::new(e)),
            }),
            Err(_) => {
                warn!("automation command ignored EOF, killing it");
                self.child.kill().await.map_err(|e| CourierError::Driver {
                    message: "failed to kill automation command".to_string(),
                    source: Some(Box::new(e)),
                })?;
                Ok(())
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn echo_driver(outcome_json: &str) -> CommandDriver {
        CommandDriver::new(DriverConfig {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("while read line; do echo '{outcome_json}'; done"),
            ],
        })
        .unwrap()
    }

    fn profile() -> ProfileRecord {
        ProfileRecord {
            profile_id: "p1".into(),
            profile_name: "alpha".into(),
            is_active: true,
            is_blocked: false,
            is_logged_out: false,
            messages_sent_current_hour: 0,
            hour_window_start: None,
            last_message_at: None,
        }
    }

    #[test]
    fn empty_command_is_a_config_error() {
        let result = CommandDriver::new(DriverConfig::default());
        assert!(matches!(result, Err(CourierError::Config(_))));
    }

    #[tokio::test]
    async fn round_trip_through_a_real_child_process() {
        let driver = echo_driver(r#"{"outcome":"success"}"#);
        let mut session = driver.open(&profile(), "h:1:u:p").await.unwrap();

        let outcome = session.send("@dest", "hello").await.unwrap();
        assert_eq!(outcome, Outcome::Success);

        // The same child answers repeated sends.
        let outcome = session.send("@dest2", "again").await.unwrap();
        assert_eq!(outcome, Outcome::Success);

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn slow_mode_wait_travels_the_wire() {
        let driver = echo_driver(r#"{"outcome":"slow_mode","wait_seconds":42}"#);
        let mut session = driver.open(&profile(), "h:1:u:p").await.unwrap();
        let outcome = session.send("@dest", "hello").await.unwrap();
        assert_eq!(outcome, Outcome::SlowMode { wait_seconds: 42 });
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn dead_child_surfaces_as_a_driver_error() {
        let driver = CommandDriver::new(DriverConfig {
            command: "true".to_string(),
            args: vec![],
        })
        .unwrap();
        let mut session = driver.open(&profile(), "h:1:u:p").await.unwrap();
        // `true` exits immediately; the send must fail, not hang.
        let result = session.send("@dest", "hello").await;
        assert!(result.is_err());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_executable_fails_at_open() {
        let driver = CommandDriver::new(DriverConfig {
            command: "/nonexistent/automation-cmd".to_string(),
            args: vec![],
        })
        .unwrap();
        let result = driver.open(&profile(), "h:1:u:p").await;
        assert!(result.is_err());
    }
}
