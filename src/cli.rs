//! CLI interface for gce-bootstrap

use crate::executors::keygen::KeyGenerator;
use crate::gcp::auth::token_source_from_settings;
use crate::gcp::compute::{http_client, ComputeClient};
use crate::logging::{init_logging, LogConfig};
use crate::models::Settings;
use crate::provision::Provisioner;
use crate::settings::{load_settings, validate_settings};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// gce-bootstrap - create a GCE instance, wait, and run one command on it over SSH
#[derive(Parser, Debug)]
#[command(name = "gce-bootstrap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Create a GCE instance, wait, and run one command on it over SSH", long_about = None)]
pub struct Cli {
    /// Settings file (YAML); gce-bootstrap.yaml is used when present
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json or pretty)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate keys, create the instance, wait, then run the command over SSH
    Run {
        /// Readiness wait in seconds
        #[arg(long)]
        wait: Option<u64>,

        /// Remote command to run
        #[arg(long)]
        command: Option<String>,

        /// Replace an existing key pair
        #[arg(long)]
        overwrite_key: bool,
    },

    /// Generate the SSH key pair only
    Keygen {
        /// Replace an existing key pair
        #[arg(long)]
        overwrite: bool,
    },

    /// Generate keys and create the instance, without waiting or SSH
    Create,

    /// Print the external IP of the instance
    Ip,

    /// Run the remote command on an existing instance
    Exec {
        /// Remote command to run
        #[arg(long)]
        command: Option<String>,
    },

    /// Print the effective settings as YAML
    Config,
}

impl Cli {
    /// Load layered settings and apply this invocation's flags on top
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = load_settings(self.config.as_deref())?;

        if let Some(level) = &self.log_level {
            settings.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            settings.logging.format = format.clone();
        }

        match &self.command {
            Commands::Run {
                wait,
                command,
                overwrite_key,
            } => {
                if let Some(wait) = wait {
                    settings.wait_secs = *wait;
                }
                if let Some(command) = command {
                    settings.ssh.command = command.clone();
                }
                if *overwrite_key {
                    settings.key.overwrite = true;
                }
            }
            Commands::Keygen { overwrite } => {
                if *overwrite {
                    settings.key.overwrite = true;
                }
            }
            Commands::Exec {
                command: Some(command),
            } => {
                settings.ssh.command = command.clone();
            }
            _ => {}
        }

        validate_settings(&settings)?;
        Ok(settings)
    }

    /// Initialize logging from the effective settings
    pub fn init_logging(&self, settings: &Settings) -> anyhow::Result<()> {
        init_logging(&LogConfig::from(&settings.logging))
    }

    /// Execute the CLI command
    pub async fn execute(&self, settings: Settings) -> anyhow::Result<()> {
        match &self.command {
            Commands::Run { .. } => self.run(settings).await?,
            Commands::Keygen { .. } => self.keygen(&settings).await?,
            Commands::Create => self.create(settings).await?,
            Commands::Ip => self.ip(settings).await?,
            Commands::Exec { .. } => self.exec(settings).await?,
            Commands::Config => print!("{}", serde_yaml::to_string(&settings)?),
        }
        Ok(())
    }

    async fn run(&self, settings: Settings) -> anyhow::Result<()> {
        info!(
            "Bootstrapping instance {} in {}/{}",
            settings.instance.name, settings.instance.project, settings.instance.zone
        );

        let provisioner = provisioner(settings)?;
        let mut stdout = std::io::stdout();
        let report = provisioner.run(&mut stdout).await?;

        info!(
            "Run complete: {} answered in {:?}",
            report.external_ip, report.output.duration
        );
        Ok(())
    }

    async fn keygen(&self, settings: &Settings) -> anyhow::Result<()> {
        let pair = KeyGenerator::new().generate(&settings.key).await?;

        if pair.generated {
            println!("Generated key pair {}", pair.private_key.display());
        } else {
            println!("Key pair {} already exists", pair.private_key.display());
        }
        println!("Public key: {}", pair.public_key.display());
        Ok(())
    }

    async fn create(&self, settings: Settings) -> anyhow::Result<()> {
        let provisioner = provisioner(settings)?;

        let pair = provisioner.generate_keys().await?;
        let operation = provisioner.create_instance(&pair).await?;

        println!("Created instance {}", provisioner.settings().instance.name);
        println!("Operation: {}", operation.name);
        Ok(())
    }

    async fn ip(&self, settings: Settings) -> anyhow::Result<()> {
        let provisioner = provisioner(settings)?;
        let ip = provisioner.external_ip().await?;
        println!("{}", ip);
        Ok(())
    }

    async fn exec(&self, settings: Settings) -> anyhow::Result<()> {
        let provisioner = provisioner(settings)?;

        let ip = provisioner.external_ip().await?;
        println!("Instance IP: {}", ip);

        let output = provisioner.run_remote_command(&ip).await?;
        println!("Command output:");
        println!("{}", output.stdout);
        Ok(())
    }
}

/// Wire the compute client and token source for these settings
fn provisioner(settings: Settings) -> anyhow::Result<Provisioner> {
    let http = http_client(Duration::from_secs(settings.gcp.http_timeout_secs))?;

    let tokens = token_source_from_settings(&settings.gcp, http.clone())?;
    let compute = ComputeClient::with_client(&settings.gcp.api_base, tokens, http)?;

    Ok(Provisioner::new(settings, compute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run_command() {
        let cli = Cli::parse_from(["gce-bootstrap", "run"]);
        assert!(matches!(
            cli.command,
            Commands::Run {
                wait: None,
                command: None,
                overwrite_key: false,
            }
        ));
    }

    #[test]
    fn test_cli_run_with_overrides() {
        let cli = Cli::parse_from([
            "gce-bootstrap",
            "run",
            "--wait",
            "5",
            "--command",
            "uname -a",
            "--overwrite-key",
        ]);
        if let Commands::Run {
            wait,
            command,
            overwrite_key,
        } = &cli.command
        {
            assert_eq!(*wait, Some(5));
            assert_eq!(command.as_deref(), Some("uname -a"));
            assert!(*overwrite_key);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "gce-bootstrap",
            "ip",
            "--log-level",
            "debug",
            "--config",
            "/tmp/bootstrap.yaml",
        ]);
        assert!(matches!(cli.command, Commands::Ip));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/bootstrap.yaml")));
    }

    #[test]
    fn test_cli_keygen_overwrite() {
        let cli = Cli::parse_from(["gce-bootstrap", "keygen", "--overwrite"]);
        assert!(matches!(cli.command, Commands::Keygen { overwrite: true }));
    }

    #[test]
    fn test_cli_exec_command() {
        let cli = Cli::parse_from(["gce-bootstrap", "exec", "--command", "df -h"]);
        if let Commands::Exec { command } = &cli.command {
            assert_eq!(command.as_deref(), Some("df -h"));
        } else {
            panic!("Expected Exec command");
        }
    }

    #[test]
    fn test_settings_apply_run_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bootstrap.yaml");
        std::fs::write(&path, "wait_secs: 30\n").unwrap();
        let path = path.to_string_lossy().into_owned();

        let cli = Cli::parse_from([
            "gce-bootstrap",
            "--config",
            path.as_str(),
            "--log-format",
            "pretty",
            "run",
            "--wait",
            "7",
            "--command",
            "hostname",
        ]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.wait_secs, 7);
        assert_eq!(settings.ssh.command, "hostname");
        assert_eq!(settings.logging.format, "pretty");
    }

    #[test]
    fn test_settings_reject_invalid_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bootstrap.yaml");
        std::fs::write(&path, "{}\n").unwrap();
        let path = path.to_string_lossy().into_owned();

        let cli = Cli::parse_from(["gce-bootstrap", "-c", path.as_str(), "run", "--wait", "99999"]);
        assert!(cli.settings().is_err());
    }
}
