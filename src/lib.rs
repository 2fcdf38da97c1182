//! gce-bootstrap - provision a GCE instance, inject an SSH key and run one remote command

pub mod cli;
pub mod error;
pub mod executors;
pub mod gcp;
pub mod logging;
pub mod models;
pub mod provision;
pub mod settings;
