//! Google Compute Engine access
//!
//! - `auth`: service-account OAuth2 token sources
//! - `compute`: REST client for images and instances
//! - `types`: request/response bodies and the instance request builder

pub mod auth;
pub mod compute;
pub mod types;

pub use auth::{StaticTokenSource, TokenSource};
pub use compute::ComputeClient;
pub use types::build_instance_request;
