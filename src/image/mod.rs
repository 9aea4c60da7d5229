//! Image values exchanged between the session and the image service.

mod data_uri;
mod types;

pub use data_uri::DataUri;
pub use types::{ImageFile, ImageFormat, ImagePayload};
