//! Provider adapters.
//!
//! A provider is configured by data: a base URL, credentials and three
//! endpoint descriptors (generate, poll status, upload). The HTTP adapter
//! materializes descriptor parameters into requests and extracts mapped
//! fields from whatever response shape the provider returns.

mod error;
mod extract;
mod http;
mod materialize;
mod registry;
mod traits;
mod types;

pub use error::ProviderError;
pub use extract::{extract, parse_body, ExtractedFields};
pub use http::HttpProviderAdapter;
pub use materialize::{materialize, RequestPayload};
pub use registry::ProviderRegistry;
pub use traits::ProviderAdapter;
pub use types::*;
