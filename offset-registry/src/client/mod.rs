//! Registry client abstraction layer.
//!
//! - HTTP client speaking the registries' verification API
//! - Static client for fixtures and testing

pub mod fixture;
pub mod http;
pub mod traits;

pub use fixture::StaticRegistry;
pub use http::HttpRegistryClient;
pub use traits::{RegistryClient, RegistryError, RegistryRecord};
