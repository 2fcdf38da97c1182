//! Layered settings loading with validation
//!
//! Precedence, lowest first:
//! 1. Built-in defaults (the values in [`crate::models`])
//! 2. YAML file (`--config`, or `gce-bootstrap.yaml` when present)
//! 3. Environment variables: `GCE_BOOTSTRAP_<SECTION>__<KEY>`
//! 4. CLI flags, applied by the caller before [`validate_settings`]

use crate::error::{BootstrapError, Result};
use crate::models::*;
use config::{Config, Environment, File, FileFormat};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "gce-bootstrap.yaml";
pub const ENV_PREFIX: &str = "GCE_BOOTSTRAP";

/// Metadata keys filled in from the startup script and the key pair
const RESERVED_METADATA_KEYS: [&str; 2] = ["startup-script", "ssh-keys"];

/// Load settings from the optional config file and the environment.
///
/// An explicitly given file must exist; the default file is optional.
///
/// # Example
///
/// ```no_run
/// use gce_bootstrap::settings::load_settings;
///
/// let settings = load_settings(None)?;
/// println!("Instance: {}", settings.instance.name);
/// # Ok::<(), gce_bootstrap::error::BootstrapError>(())
/// ```
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let (file, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    debug!("Loading settings from {:?} (required: {})", file, required);

    let settings: Settings = Config::builder()
        .add_source(
            File::from(file.as_path())
                .format(FileFormat::Yaml)
                .required(required),
        )
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    validate_settings(&settings)?;

    Ok(settings)
}

/// Validate merged settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    let instance = &settings.instance;

    for (field, value) in [
        ("instance.project", &instance.project),
        ("instance.zone", &instance.zone),
        ("instance.name", &instance.name),
        ("instance.machine_type", &instance.machine_type),
        ("instance.disk_name", &instance.disk_name),
        ("instance.disk_type", &instance.disk_type),
        ("instance.image_project", &instance.image_project),
        ("instance.image_family", &instance.image_family),
        ("instance.network", &instance.network),
        ("gcp.api_base", &settings.gcp.api_base),
    ] {
        if value.trim().is_empty() {
            return Err(BootstrapError::Validation(format!(
                "{} cannot be empty",
                field
            )));
        }
    }

    if instance.disk_size_gb < MIN_DISK_SIZE_GB {
        return Err(BootstrapError::Validation(format!(
            "instance.disk_size_gb must be at least {}, got: {}",
            MIN_DISK_SIZE_GB, instance.disk_size_gb
        )));
    }

    if settings.wait_secs > MAX_WAIT_SECS {
        return Err(BootstrapError::Validation(format!(
            "wait_secs must be at most {}, got: {}",
            MAX_WAIT_SECS, settings.wait_secs
        )));
    }

    if settings.key.bits < MIN_KEY_BITS {
        return Err(BootstrapError::Validation(format!(
            "key.bits must be at least {}, got: {}",
            MIN_KEY_BITS, settings.key.bits
        )));
    }

    if settings.key.path.as_os_str().is_empty() {
        return Err(BootstrapError::Validation(
            "key.path cannot be empty".to_string(),
        ));
    }

    if settings.ssh.port == 0 {
        return Err(BootstrapError::Validation(
            "ssh.port cannot be 0".to_string(),
        ));
    }

    if settings.ssh.command.is_empty() {
        return Err(BootstrapError::Validation(
            "ssh.command cannot be empty".to_string(),
        ));
    }

    if settings.ssh.command.len() > MAX_COMMAND_LEN {
        return Err(BootstrapError::Validation(format!(
            "ssh.command exceeds maximum length of {} bytes",
            MAX_COMMAND_LEN
        )));
    }

    let mut seen = HashSet::new();
    for entry in &instance.metadata {
        if entry.key.trim().is_empty() {
            return Err(BootstrapError::Validation(
                "instance.metadata keys cannot be empty".to_string(),
            ));
        }
        if RESERVED_METADATA_KEYS.contains(&entry.key.as_str()) {
            return Err(BootstrapError::Validation(format!(
                "instance.metadata cannot set '{}', it is managed by gce-bootstrap",
                entry.key
            )));
        }
        if !seen.insert(entry.key.as_str()) {
            return Err(BootstrapError::Validation(format!(
                "instance.metadata key '{}' is given more than once",
                entry.key
            )));
        }
    }

    if settings.gcp.http_timeout_secs == 0 {
        return Err(BootstrapError::Validation(
            "gcp.http_timeout_secs must be at least 1".to_string(),
        ));
    }

    Ok(())
}
