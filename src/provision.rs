//! The provisioning pipeline
//!
//! Strictly sequential, no retries:
//! 1. generate (or reuse) the SSH key pair
//! 2. resolve the boot image from its family
//! 3. insert the instance with the startup script and `ssh-keys` metadata
//! 4. sleep a fixed readiness delay
//! 5. look up the instance's external IP
//! 6. SSH in and run the remote command
//!
//! The first failing step aborts the run. Progress lines a user asked for
//! are written to the supplied writer (stdout for the CLI); everything else
//! goes to the log.
//!
//! A full run listens for SIGINT and SIGTERM from its first step to its last.
//! Either signal aborts the step in flight with
//! [`BootstrapError::Interrupted`] naming that step.

use crate::error::{BootstrapError, Result};
use crate::executors::keygen::{read_public_key, ssh_keys_metadata, KeyGenerator, KeyPair};
use crate::executors::ssh::SshExecutor;
use crate::gcp::compute::ComputeClient;
use crate::gcp::types::{build_instance_request, InstanceRequest, Operation};
use crate::models::{ExecutionResult, Settings, SshTarget};
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{info, info_span, warn, Instrument};

/// What a full run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub key_pair: KeyPair,
    pub operation: Operation,
    pub external_ip: String,
    pub output: ExecutionResult,
}

/// SIGINT and SIGTERM listeners.
///
/// Installing them removes the default action of both signals for the rest
/// of the process, so every step after [`Interrupts::install`] has to go
/// through [`Interrupts::guard`].
pub struct Interrupts {
    sigterm: Signal,
    sigint: Signal,
}

impl Interrupts {
    pub fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate()).map_err(|e| {
            BootstrapError::Other(format!("Failed to setup SIGTERM handler: {}", e))
        })?;
        let sigint = signal(SignalKind::interrupt()).map_err(|e| {
            BootstrapError::Other(format!("Failed to setup SIGINT handler: {}", e))
        })?;

        Ok(Self { sigterm, sigint })
    }

    /// Run `step` to completion unless a signal arrives first
    pub async fn guard<T, F>(&mut self, step: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            result = future => result,
            _ = self.sigterm.recv() => {
                warn!("Received SIGTERM during {}", step);
                Err(BootstrapError::Interrupted(step.to_string()))
            }
            _ = self.sigint.recv() => {
                warn!("Received SIGINT during {}", step);
                Err(BootstrapError::Interrupted(step.to_string()))
            }
        }
    }
}

/// Drives one instance from nothing to one executed remote command
pub struct Provisioner {
    settings: Settings,
    compute: ComputeClient,
    keygen: KeyGenerator,
    ssh: SshExecutor,
}

impl Provisioner {
    pub fn new(settings: Settings, compute: ComputeClient) -> Self {
        Self {
            settings,
            compute,
            keygen: KeyGenerator::new(),
            ssh: SshExecutor::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Step 1
    pub async fn generate_keys(&self) -> Result<KeyPair> {
        self.keygen
            .generate(&self.settings.key)
            .instrument(info_span!("keygen"))
            .await
    }

    /// Steps 2 and 3: read inputs, resolve the image, build the request
    pub async fn prepare_request(&self, key_pair: &KeyPair) -> Result<InstanceRequest> {
        let instance = &self.settings.instance;

        let startup_script = tokio::fs::read_to_string(&instance.startup_script)
            .await
            .map_err(|e| {
                BootstrapError::Validation(format!(
                    "Cannot read startup script {}: {}",
                    instance.startup_script.display(),
                    e
                ))
            })?;

        let public_key = read_public_key(&key_pair.public_key).await?;
        let ssh_keys = ssh_keys_metadata(&self.settings.ssh.user, &public_key)?;

        let image = self
            .compute
            .image_from_family(&instance.image_project, &instance.image_family)
            .await?;

        Ok(build_instance_request(
            instance,
            &image.self_link,
            &ssh_keys,
            &startup_script,
        ))
    }

    /// Step 3: submit the instance insert
    pub async fn create_instance(&self, key_pair: &KeyPair) -> Result<Operation> {
        let instance = &self.settings.instance;

        async {
            let request = self.prepare_request(key_pair).await?;
            self.compute
                .insert_instance(&instance.project, &instance.zone, &request)
                .await
        }
        .instrument(info_span!("create_instance", name = %instance.name))
        .await
    }

    /// Step 4: fixed, unconditional delay
    pub async fn wait_for_readiness(&self) -> Result<Duration> {
        let wait = Duration::from_secs(self.settings.wait_secs);
        info!("Waiting {:?} for the instance to boot", wait);

        tokio::time::sleep(wait).await;
        Ok(wait)
    }

    /// Step 5
    pub async fn external_ip(&self) -> Result<String> {
        let instance = &self.settings.instance;
        self.compute
            .instance_external_ip(&instance.project, &instance.zone, &instance.name)
            .instrument(info_span!("lookup_ip", name = %instance.name))
            .await
    }

    /// Step 6
    pub async fn run_remote_command(&self, host: &str) -> Result<ExecutionResult> {
        let target = SshTarget::from_settings(host, &self.settings.ssh, &self.settings.key);
        self.ssh
            .execute(&target)
            .instrument(info_span!("ssh", host = %host))
            .await
    }

    /// Run every step in order, aborting on SIGINT or SIGTERM
    pub async fn run(&self, out: &mut (dyn Write + Send)) -> Result<RunReport> {
        let mut interrupts = Interrupts::install()?;

        let key_pair = interrupts
            .guard("key generation", self.generate_keys())
            .await?;
        if key_pair.generated {
            writeln!(out, "Generated key pair {}", key_pair.private_key.display())?;
        }

        let operation = interrupts
            .guard("instance creation", self.create_instance(&key_pair))
            .await?;
        writeln!(out, "Created instance {}", self.settings.instance.name)?;

        let slept = interrupts
            .guard(
                "readiness wait",
                self.wait_for_readiness()
                    .instrument(info_span!("readiness_wait")),
            )
            .await?;
        writeln!(out, "Slept {}s", slept.as_secs())?;

        let external_ip = interrupts
            .guard("instance IP lookup", self.external_ip())
            .await?;
        writeln!(out, "Instance IP: {}", external_ip)?;

        let output = interrupts
            .guard("remote command", self.run_remote_command(&external_ip))
            .await?;
        writeln!(out, "Command output:")?;
        writeln!(out, "{}", output.stdout)?;

        Ok(RunReport {
            key_pair,
            operation,
            external_ip,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_step_result_through() {
        let mut interrupts = Interrupts::install().unwrap();

        let value = interrupts
            .guard("lookup", async { Ok::<_, BootstrapError>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);

        let result: Result<()> = interrupts
            .guard("lookup", async {
                Err(BootstrapError::NoExternalIp("shaad-test".to_string()))
            })
            .await;
        assert!(matches!(result, Err(BootstrapError::NoExternalIp(_))));
    }
}
