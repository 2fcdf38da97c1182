//! SSH key pair generation through `ssh-keygen`

use crate::error::{BootstrapError, Result};
use crate::models::KeySettings;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Name of the external key generation tool
pub const KEYGEN_TOOL: &str = "ssh-keygen";

/// Paths of a key pair on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
    /// False when an existing pair was reused
    pub generated: bool,
}

/// Local key generator
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    program: PathBuf,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(KEYGEN_TOOL),
        }
    }

    /// Use a different `ssh-keygen` binary
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Argument list for an RSA key without passphrase. Never passed through a shell.
    fn keygen_args(config: &KeySettings) -> Vec<String> {
        vec![
            "-t".to_string(),
            "rsa".to_string(),
            "-b".to_string(),
            config.bits.to_string(),
            "-f".to_string(),
            config.path.to_string_lossy().into_owned(),
            "-N".to_string(),
            String::new(),
            "-q".to_string(),
        ]
    }

    /// Generate a key pair, or reuse the existing one unless `overwrite` is set
    pub async fn generate(&self, config: &KeySettings) -> Result<KeyPair> {
        let private_key = config.path.clone();
        let public_key = config.public_key_path();

        if private_key.exists() {
            if !config.overwrite {
                info!("Reusing existing key pair at {:?}", private_key);
                return Ok(KeyPair {
                    private_key,
                    public_key,
                    generated: false,
                });
            }

            debug!("Removing existing key pair at {:?}", private_key);
            remove_if_exists(&private_key).await?;
            remove_if_exists(&public_key).await?;
        }

        if let Some(parent) = private_key.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let args = Self::keygen_args(config);
        info!("Generating {}-bit RSA key pair at {:?}", config.bits, private_key);
        debug!("Command: {:?} {:?}", self.program, args);

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout_secs = config.keygen_timeout_secs;
        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!("Failed to start {:?}: {}", self.program, e);
                return Err(BootstrapError::KeyGeneration(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                )));
            }
            Err(_) => {
                error!("{:?} timed out after {} seconds", self.program, timeout_secs);
                return Err(BootstrapError::ToolTimeout {
                    tool: self.program.display().to_string(),
                    timeout: timeout_secs,
                });
            }
        };

        if !output.status.success() {
            let (stderr, _) = crate::executors::truncate_output_bytes(&output.stderr);
            return Err(BootstrapError::KeyGeneration(format!(
                "{} exited with {:?}: {}",
                self.program.display(),
                output.status.code(),
                stderr.trim()
            )));
        }

        if !public_key.exists() {
            return Err(BootstrapError::KeyGeneration(format!(
                "public key not found at {}",
                public_key.display()
            )));
        }

        info!("Key pair generated");

        Ok(KeyPair {
            private_key,
            public_key,
            generated: true,
        })
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BootstrapError::Io(e)),
    }
}

/// Read an OpenSSH public key, trimmed of surrounding whitespace
pub async fn read_public_key(path: &Path) -> Result<String> {
    let contents = tokio::fs::read_to_string(path).await?;
    let key = contents.trim();

    if key.is_empty() {
        return Err(BootstrapError::Validation(format!(
            "Public key file is empty: {}",
            path.display()
        )));
    }

    Ok(key.to_string())
}

/// Value of the `ssh-keys` instance metadata item
pub fn ssh_keys_metadata(user: &str, public_key: &str) -> Result<String> {
    if user.is_empty() {
        return Err(BootstrapError::Validation(
            "SSH user cannot be empty (set USER or ssh.user)".to_string(),
        ));
    }

    Ok(format!("{}:{}", user, public_key.trim()))
}
