//! The image service boundary.

use crate::error::Result;
use crate::image::{ImageFile, ImagePayload};
use async_trait::async_trait;

/// A generative-image backend.
///
/// Every call is single-shot: one request, one result or error. Callers never
/// issue two calls concurrently for the same session.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Answers a question about an image.
    async fn analyze(&self, image: &ImageFile, prompt: &str) -> Result<String>;

    /// Generates an image from a text prompt.
    async fn generate(&self, prompt: &str) -> Result<ImagePayload>;

    /// Edits an image according to a text prompt.
    async fn edit(&self, image: &ImageFile, prompt: &str) -> Result<ImagePayload>;

    /// Places the furniture shown in `model` into the room shown in `environment`.
    async fn visualize(&self, environment: &ImageFile, model: &ImageFile)
        -> Result<ImagePayload>;

    /// Returns the name of this service for display.
    fn name(&self) -> &str;

    /// Checks if the service is reachable and authenticated.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
