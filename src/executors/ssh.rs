//! SSH executor for the single remote command
//!
//! - **Key-based authentication ONLY** (no password support)
//! - One TCP connection, one session channel, one `exec`
//! - Bounded connect and I/O timeouts
//!
//! Host keys are not verified: the target is a machine created seconds
//! earlier whose host key cannot be known in advance.
//!
//! # Example
//!
//! ```no_run
//! use gce_bootstrap::executors::ssh::SshExecutor;
//! use gce_bootstrap::models::{KeySettings, SshSettings, SshTarget};
//!
//! # async fn example() -> gce_bootstrap::error::Result<()> {
//! let target = SshTarget::from_settings(
//!     "203.0.113.7",
//!     &SshSettings::default(),
//!     &KeySettings::default(),
//! );
//!
//! let result = SshExecutor::new().execute(&target).await?;
//! println!("{}", result.stdout);
//! # Ok(())
//! # }
//! ```

use crate::error::{BootstrapError, Result};
use crate::executors::truncate_output_bytes;
use crate::models::{ExecutionResult, SshTarget, MAX_COMMAND_LEN, MAX_OUTPUT_SIZE};
use ssh2::Session;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// SSH executor for remote command execution
#[derive(Debug, Clone, Default)]
pub struct SshExecutor;

impl SshExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Validate the target before touching the network
    fn validate_target(target: &SshTarget) -> Result<()> {
        if target.host.is_empty() {
            return Err(BootstrapError::Validation(
                "SSH host cannot be empty".to_string(),
            ));
        }

        if target.user.is_empty() {
            return Err(BootstrapError::Validation(
                "SSH user cannot be empty".to_string(),
            ));
        }

        if target.command.is_empty() {
            return Err(BootstrapError::Validation(
                "SSH command cannot be empty".to_string(),
            ));
        }

        if target.command.len() > MAX_COMMAND_LEN {
            return Err(BootstrapError::Validation(format!(
                "SSH command exceeds maximum length of {} bytes",
                MAX_COMMAND_LEN
            )));
        }

        if !target.key_path.exists() {
            return Err(BootstrapError::Validation(format!(
                "SSH key file not found: {}",
                target.key_path.display()
            )));
        }

        Ok(())
    }

    fn ssh_error(target: &SshTarget, message: String) -> BootstrapError {
        BootstrapError::Ssh {
            host: target.host.clone(),
            message,
        }
    }

    /// Connect, handshake and authenticate with the private key
    fn create_session(target: &SshTarget) -> Result<Session> {
        let address = format!("{}:{}", target.host, target.port);

        debug!("Creating SSH session to {}", address);

        let socket_addr = address
            .to_socket_addrs()
            .map_err(|e| {
                BootstrapError::Validation(format!("Invalid host address '{}': {}", address, e))
            })?
            .next()
            .ok_or_else(|| {
                BootstrapError::Validation(format!("Host '{}' did not resolve", target.host))
            })?;

        let tcp = TcpStream::connect_timeout(&socket_addr, target.connect_timeout)
            .map_err(|e| Self::ssh_error(target, format!("Failed to connect: {}", e)))?;

        tcp.set_read_timeout(Some(target.io_timeout))?;
        tcp.set_write_timeout(Some(target.io_timeout))?;

        let mut session = Session::new()
            .map_err(|e| Self::ssh_error(target, format!("Failed to create SSH session: {}", e)))?;

        session.set_tcp_stream(tcp);
        session.set_timeout(duration_millis(target.io_timeout));
        session
            .handshake()
            .map_err(|e| Self::ssh_error(target, format!("SSH handshake failed: {}", e)))?;

        debug!("Authenticating as {} with key {:?}", target.user, target.key_path);
        session
            .userauth_pubkey_file(&target.user, None, &target.key_path, None)
            .map_err(|e| Self::ssh_error(target, format!("Authentication failed: {}", e)))?;

        if !session.authenticated() {
            return Err(Self::ssh_error(target, "Authentication failed".to_string()));
        }

        info!("SSH session established to {}", address);

        Ok(session)
    }

    /// Run the command over SSH.
    ///
    /// A non-zero exit status is returned as [`BootstrapError::RemoteCommandFailed`].
    pub async fn execute(&self, target: &SshTarget) -> Result<ExecutionResult> {
        Self::validate_target(target)?;

        info!(
            "Executing SSH command on {}@{}: {}",
            target.user, target.host, target.command
        );

        let start = Instant::now();

        // libssh2 is blocking
        let target_clone = target.clone();
        let mut result = tokio::task::spawn_blocking(move || Self::execute_blocking(&target_clone))
            .await
            .map_err(|e| BootstrapError::Other(format!("SSH task join error: {}", e)))??;

        result.duration = start.elapsed();

        info!(
            "SSH command completed in {:?} with exit code {}",
            result.duration, result.exit_code
        );

        check_exit(result)
    }

    fn execute_blocking(target: &SshTarget) -> Result<ExecutionResult> {
        let session = Self::create_session(target)?;

        let mut channel = session
            .channel_session()
            .map_err(|e| Self::ssh_error(target, format!("Failed to open channel: {}", e)))?;

        debug!("Executing command: {}", target.command);

        channel
            .exec(&target.command)
            .map_err(|e| Self::ssh_error(target, format!("Failed to execute command: {}", e)))?;

        let mut stdout = Vec::new();
        channel
            .read_to_end(&mut stdout)
            .map_err(|e| Self::ssh_error(target, format!("Failed to read stdout: {}", e)))?;

        let mut stderr = Vec::new();
        channel
            .stderr()
            .read_to_end(&mut stderr)
            .map_err(|e| Self::ssh_error(target, format!("Failed to read stderr: {}", e)))?;

        channel
            .wait_close()
            .map_err(|e| Self::ssh_error(target, format!("Failed to close channel: {}", e)))?;

        let exit_code = channel
            .exit_status()
            .map_err(|e| Self::ssh_error(target, format!("Failed to get exit status: {}", e)))?;

        let (stdout, stdout_truncated) = truncate_output_bytes(&stdout);
        let (stderr, stderr_truncated) = truncate_output_bytes(&stderr);
        let output_truncated = stdout_truncated || stderr_truncated;

        if output_truncated {
            warn!("Output truncated to {} bytes", MAX_OUTPUT_SIZE);
        }

        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code,
            duration: Duration::ZERO,
            output_truncated,
        })
    }
}

/// Map a non-zero exit status to [`BootstrapError::RemoteCommandFailed`]
pub fn check_exit(result: ExecutionResult) -> Result<ExecutionResult> {
    if result.exit_code != 0 {
        return Err(BootstrapError::RemoteCommandFailed {
            exit_code: result.exit_code,
            stderr: result.stderr.trim().to_string(),
        });
    }

    Ok(result)
}

/// libssh2 takes its blocking timeout in milliseconds as u32
fn duration_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}
