//! Shared fixtures for the pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use gce_bootstrap::error::Result;
use gce_bootstrap::gcp::auth::TokenSource;
use gce_bootstrap::gcp::compute::ComputeClient;
use gce_bootstrap::models::Settings;
use gce_bootstrap::provision::Provisioner;
use mockall::mock;
use serde_json::json;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mock! {
    pub Tokens {}

    #[async_trait]
    impl TokenSource for Tokens {
        async fn access_token(&self) -> Result<String>;
    }
}

pub const IMAGE_PATH: &str =
    "/compute/v1/projects/ubuntu-os-cloud/global/images/family/ubuntu-2204-lts";
pub const INSTANCES_PATH: &str =
    "/compute/v1/projects/appscode-testing/zones/us-central1-a/instances";
pub const IMAGE_LINK: &str =
    "https://www.googleapis.com/compute/v1/projects/ubuntu-os-cloud/global/images/ubuntu-2204-jammy-v20240319";
pub const STARTUP_SCRIPT: &str = "#!/bin/bash\necho hello > /hello.txt\n";

pub fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Settings with an existing key pair and startup script in `dir`
pub fn test_settings(dir: &TempDir, server: &MockServer) -> Settings {
    let mut settings = Settings::default();

    settings.gcp.api_base = format!("{}/compute/v1", server.uri());

    settings.key.path = dir.path().join("id_rsa");
    std::fs::write(&settings.key.path, "placeholder private key").unwrap();
    std::fs::write(
        settings.key.public_key_path(),
        "ssh-rsa AAAAB3NzaC1yc2E tester@laptop\n",
    )
    .unwrap();

    settings.instance.startup_script = dir.path().join("startup-script.sh");
    std::fs::write(&settings.instance.startup_script, STARTUP_SCRIPT).unwrap();

    settings.ssh.user = "tester".to_string();
    settings.ssh.port = unused_port();
    settings.ssh.connect_timeout_secs = 2;
    settings.wait_secs = 0;

    settings
}

pub fn provisioner(settings: Settings, tokens: MockTokens) -> Provisioner {
    let compute = ComputeClient::new(
        &settings.gcp.api_base,
        Arc::new(tokens),
        Duration::from_secs(60),
    )
    .unwrap();
    Provisioner::new(settings, compute)
}

/// Token source that always hands out the same token
pub fn any_tokens() -> MockTokens {
    let mut tokens = MockTokens::new();
    tokens
        .expect_access_token()
        .returning(|| Ok("ya29.mock".to_string()));
    tokens
}

pub async fn mount_image(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(IMAGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "ubuntu-2204-jammy-v20240319",
            "selfLink": IMAGE_LINK,
        })))
        .expect(1)
        .mount(server)
        .await;
}

pub async fn mount_insert(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(INSTANCES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "operation-1",
            "status": "PENDING",
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Send `signal` (e.g. `-TERM`) to this test process after `delay`
pub fn signal_self_after(signal: &'static str, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let status = tokio::process::Command::new("kill")
            .arg(signal)
            .arg(std::process::id().to_string())
            .status()
            .await
            .unwrap();
        assert!(status.success());
    });
}
