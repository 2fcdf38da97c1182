//! Settings and result models for gce-bootstrap

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// Input validation limits
pub const MAX_COMMAND_LEN: usize = 4_096; // 4 KB
pub const MAX_OUTPUT_SIZE: usize = 10_485_760; // 10 MB
pub const MAX_WAIT_SECS: u64 = 3_600;
pub const MIN_DISK_SIZE_GB: u64 = 10;
pub const MIN_KEY_BITS: u32 = 2_048;

pub const DEFAULT_API_BASE: &str = "https://compute.googleapis.com/compute/v1";

/// Effective settings after all configuration layers are merged
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gcp: GcpSettings,
    pub instance: InstanceSettings,
    pub key: KeySettings,
    pub ssh: SshSettings,
    /// Readiness sleep between instance creation and SSH, in seconds
    pub wait_secs: u64,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gcp: GcpSettings::default(),
            instance: InstanceSettings::default(),
            key: KeySettings::default(),
            ssh: SshSettings::default(),
            wait_secs: 60,
            logging: LoggingSettings::default(),
        }
    }
}

/// Compute API access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpSettings {
    pub api_base: String,
    /// Service-account JSON file, used when GCP_CREDENTIAL is unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,
    /// Pre-minted OAuth2 access token, bypasses the service-account flow
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for GcpSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            credentials_file: None,
            access_token: None,
            http_timeout_secs: 60,
        }
    }
}

/// Shape of the instance to create
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceSettings {
    pub project: String,
    pub zone: String,
    pub name: String,
    pub machine_type: String,
    pub disk_name: String,
    pub disk_type: String,
    pub disk_size_gb: u64,
    pub image_project: String,
    pub image_family: String,
    pub network: String,
    pub startup_script: PathBuf,
    /// Extra metadata items, sent in order between the startup script and ssh-keys
    pub metadata: Vec<MetadataEntry>,
}

/// One extra instance metadata item.
///
/// A list rather than a map: the config loader lowercases map keys, and
/// metadata keys are case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            project: "appscode-testing".to_string(),
            zone: "us-central1-a".to_string(),
            name: "shaad-test".to_string(),
            machine_type: "n1-standard-2".to_string(),
            disk_name: "shaad-disk".to_string(),
            disk_type: "pd-ssd".to_string(),
            disk_size_gb: 10,
            image_project: "ubuntu-os-cloud".to_string(),
            image_family: "ubuntu-2204-lts".to_string(),
            network: "global/networks/default".to_string(),
            startup_script: PathBuf::from("startup-script.sh"),
            metadata: vec![MetadataEntry::new("envr", "AppsCode")],
        }
    }
}

impl InstanceSettings {
    /// Partial URL of the machine type, as the insert call expects it
    pub fn machine_type_url(&self) -> String {
        format!(
            "projects/{}/zones/{}/machineTypes/{}",
            self.project, self.zone, self.machine_type
        )
    }

    pub fn disk_type_url(&self) -> String {
        format!("zones/{}/diskTypes/{}", self.zone, self.disk_type)
    }
}

/// Local key pair handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    /// Private key path; the public key lives next to it with a `.pub` suffix
    pub path: PathBuf,
    pub bits: u32,
    /// Replace an existing key pair instead of reusing it
    pub overwrite: bool,
    pub keygen_timeout_secs: u64,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("id_rsa"),
            bits: 2_048,
            overwrite: false,
            keygen_timeout_secs: 30,
        }
    }
}

impl KeySettings {
    pub fn public_key_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".pub");
        PathBuf::from(path)
    }
}

/// SSH session parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub user: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub io_timeout_secs: u64,
    pub command: String,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: std::env::var("USER").unwrap_or_default(),
            port: 22,
            connect_timeout_secs: 5,
            io_timeout_secs: 30,
            command: "cat /hello.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Fully resolved SSH target for a single remote command
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: PathBuf,
    pub command: String,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl SshTarget {
    /// Build a target for `host` from the SSH and key settings
    pub fn from_settings(host: impl Into<String>, ssh: &SshSettings, key: &KeySettings) -> Self {
        Self {
            host: host.into(),
            port: ssh.port,
            user: ssh.user.clone(),
            key_path: key.path.clone(),
            command: ssh.command.clone(),
            connect_timeout: Duration::from_secs(ssh.connect_timeout_secs),
            io_timeout: Duration::from_secs(ssh.io_timeout_secs),
        }
    }
}

/// Result of a remote command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
    #[serde(default)]
    pub output_truncated: bool, // True if output exceeded MAX_OUTPUT_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_match_hardcoded_values() {
        let settings = Settings::default();
        assert_eq!(settings.wait_secs, 60);
        assert_eq!(settings.instance.project, "appscode-testing");
        assert_eq!(settings.instance.zone, "us-central1-a");
        assert_eq!(settings.instance.disk_size_gb, 10);
        assert_eq!(settings.ssh.port, 22);
        assert_eq!(settings.ssh.connect_timeout_secs, 5);
        assert_eq!(settings.ssh.command, "cat /hello.txt");
        assert_eq!(settings.key.bits, 2048);
        assert_eq!(
            settings.instance.metadata,
            vec![MetadataEntry::new("envr", "AppsCode")]
        );
    }

    #[test]
    fn test_resource_urls() {
        let instance = InstanceSettings::default();
        assert_eq!(
            instance.machine_type_url(),
            "projects/appscode-testing/zones/us-central1-a/machineTypes/n1-standard-2"
        );
        assert_eq!(instance.disk_type_url(), "zones/us-central1-a/diskTypes/pd-ssd");
    }

    #[test]
    fn test_public_key_path_appends_suffix() {
        let key = KeySettings {
            path: PathBuf::from("keys/deploy.key"),
            ..KeySettings::default()
        };
        assert_eq!(key.public_key_path(), PathBuf::from("keys/deploy.key.pub"));
        assert_eq!(
            KeySettings::default().public_key_path(),
            PathBuf::from("id_rsa.pub")
        );
    }

    #[test]
    fn test_access_token_never_serialized() {
        let mut settings = Settings::default();
        settings.gcp.access_token = Some("secret-token".to_string());
        let yaml = serde_yaml::to_string(&settings).unwrap();
        assert!(!yaml.contains("secret-token"));
        assert!(!yaml.contains("access_token"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
instance:
  zone: europe-west1-b
wait_secs: 5
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.instance.zone, "europe-west1-b");
        assert_eq!(settings.instance.project, "appscode-testing");
        assert_eq!(settings.wait_secs, 5);
        assert_eq!(settings.ssh.port, 22);
    }

    #[test]
    fn test_ssh_target_from_settings() {
        let ssh = SshSettings {
            user: "deploy".to_string(),
            ..SshSettings::default()
        };
        let target = SshTarget::from_settings("203.0.113.7", &ssh, &KeySettings::default());
        assert_eq!(target.host, "203.0.113.7");
        assert_eq!(target.user, "deploy");
        assert_eq!(target.port, 22);
        assert_eq!(target.connect_timeout, Duration::from_secs(5));
        assert_eq!(target.key_path, PathBuf::from("id_rsa"));
    }
}
