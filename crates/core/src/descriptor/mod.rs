//! Declarative endpoint descriptors.
//!
//! A descriptor names one HTTP operation of a provider: its path, method,
//! typed parameters with defaults, and where each result lives in the
//! response body.

mod path;
mod presets;
mod types;
mod validate;

pub use path::{get_by_path, parse_path, set_by_path, Segment};
pub use presets::EndpointPreset;
pub use types::*;
pub use validate::{
    validate_descriptor, validate_endpoint_set, IMAGE_URL_KEY, STATUS_KEY, TASK_ID_KEY,
    THUMBNAIL_URL_KEY, VIDEO_URL_KEY,
};
