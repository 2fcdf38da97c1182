//! Compute API request and response bodies
//!
//! Only the fields this tool sends or reads are modelled; unknown response
//! fields are ignored.

use crate::models::InstanceSettings;
use serde::{Deserialize, Serialize};

/// Service-account key file, as downloaded from the console
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

fn default_token_uri() -> String {
    crate::gcp::auth::DEFAULT_TOKEN_URI.to_string()
}

/// OAuth2 token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Body of `instances.insert`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRequest {
    pub name: String,
    pub machine_type: String,
    pub disks: Vec<AttachedDisk>,
    pub network_interfaces: Vec<NetworkInterface>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    pub auto_delete: bool,
    pub boot: bool,
    #[serde(rename = "type")]
    pub disk_type: String,
    pub initialize_params: InitializeParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub disk_name: String,
    pub disk_type: String,
    pub source_image: String,
    /// int64 fields travel as JSON strings
    pub disk_size_gb: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub access_type: String,
    #[serde(rename = "natIP", default, skip_serializing_if = "Option::is_none")]
    pub nat_ip: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

/// Image resource, as returned by `images.getFromFamily`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub name: String,
    pub self_link: String,
    #[serde(default)]
    pub family: Option<String>,
}

/// Instance resource, as returned by `instances.get`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
}

impl Instance {
    /// First non-empty NAT address across all interfaces and access configs
    pub fn external_ip(&self) -> Option<&str> {
        self.network_interfaces
            .iter()
            .flat_map(|ni| ni.access_configs.iter())
            .filter_map(|ac| ac.nat_ip.as_deref())
            .find(|ip| !ip.is_empty())
    }
}

/// Zonal operation returned by mutating calls
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub target_link: Option<String>,
    #[serde(default)]
    pub operation_type: Option<String>,
}

/// Google API error envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Build the `instances.insert` body.
///
/// Metadata order: `startup-script`, extra items as configured, `ssh-keys`.
pub fn build_instance_request(
    instance: &InstanceSettings,
    source_image: &str,
    ssh_keys: &str,
    startup_script: &str,
) -> InstanceRequest {
    let mut items = Vec::with_capacity(instance.metadata.len() + 2);
    items.push(MetadataItem {
        key: "startup-script".to_string(),
        value: startup_script.to_string(),
    });
    items.extend(instance.metadata.iter().map(|entry| MetadataItem {
        key: entry.key.clone(),
        value: entry.value.clone(),
    }));
    items.push(MetadataItem {
        key: "ssh-keys".to_string(),
        value: ssh_keys.to_string(),
    });

    InstanceRequest {
        name: instance.name.clone(),
        machine_type: instance.machine_type_url(),
        disks: vec![AttachedDisk {
            auto_delete: true,
            boot: true,
            disk_type: "PERSISTENT".to_string(),
            initialize_params: InitializeParams {
                disk_name: instance.disk_name.clone(),
                disk_type: instance.disk_type_url(),
                source_image: source_image.to_string(),
                disk_size_gb: instance.disk_size_gb.to_string(),
            },
        }],
        network_interfaces: vec![NetworkInterface {
            network: Some(instance.network.clone()),
            access_configs: vec![AccessConfig {
                name: "External NAT".to_string(),
                access_type: "ONE_TO_ONE_NAT".to_string(),
                nat_ip: None,
            }],
        }],
        metadata: Metadata { items },
    }
}
