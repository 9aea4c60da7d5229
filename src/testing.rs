//! Scripted image service for tests.

use crate::error::{DekovizError, Result};
use crate::image::{ImageFile, ImagePayload};
use crate::service::ImageService;
use async_trait::async_trait;
use std::sync::Mutex;

/// A minimal PNG header, enough for format detection.
pub(crate) const PNG_BYTES: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

pub(crate) fn png_file(name: &str) -> ImageFile {
    ImageFile::new(name, "image/png", PNG_BYTES.to_vec())
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Analyze { image: ImageFile, prompt: String },
    Generate { prompt: String },
    Edit { image: ImageFile, prompt: String },
    Visualize { environment: ImageFile, model: ImageFile },
}

/// Records calls and answers with canned replies.
pub(crate) struct MockService {
    calls: Mutex<Vec<Call>>,
    image: Mutex<ImagePayload>,
    text: String,
    failure: Mutex<Option<String>>,
}

impl MockService {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            image: Mutex::new(png_file("reply.png").to_payload()),
            text: "A mid-century walnut chair with tapered legs.".to_string(),
            failure: Mutex::new(None),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn image_payload(&self) -> ImagePayload {
        self.image.lock().unwrap().clone()
    }

    pub(crate) fn text_reply(&self) -> String {
        self.text.clone()
    }

    pub(crate) fn set_image_reply(&self, payload: ImagePayload) {
        *self.image.lock().unwrap() = payload;
    }

    /// Makes every following call fail with an API error carrying `message`.
    pub(crate) fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub(crate) fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(DekovizError::Api {
                status: 500,
                message,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ImageService for MockService {
    async fn analyze(&self, image: &ImageFile, prompt: &str) -> Result<String> {
        self.record(Call::Analyze {
            image: image.clone(),
            prompt: prompt.to_string(),
        })?;
        Ok(self.text.clone())
    }

    async fn generate(&self, prompt: &str) -> Result<ImagePayload> {
        self.record(Call::Generate {
            prompt: prompt.to_string(),
        })?;
        Ok(self.image_payload())
    }

    async fn edit(&self, image: &ImageFile, prompt: &str) -> Result<ImagePayload> {
        self.record(Call::Edit {
            image: image.clone(),
            prompt: prompt.to_string(),
        })?;
        Ok(self.image_payload())
    }

    async fn visualize(
        &self,
        environment: &ImageFile,
        model: &ImageFile,
    ) -> Result<ImagePayload> {
        self.record(Call::Visualize {
            environment: environment.clone(),
            model: model.clone(),
        })?;
        Ok(self.image_payload())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
