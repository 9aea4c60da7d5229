#![warn(missing_docs)]
//! Dekoviz - AI furniture visualization sessions.
//!
//! This crate drives a multi-mode session (visualize, generate, edit,
//! analyze) against a generative-image service. The [`SessionController`]
//! owns all session state, validates inputs per mode and issues exactly one
//! [`ImageService`] call per run.
//!
//! # Quick Start
//!
//! ```no_run
//! use dekoviz::{GeminiService, ImageFile, Mode, RunOutcome, SessionController};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> dekoviz::Result<()> {
//!     let service = Arc::new(GeminiService::builder().build()?);
//!     let mut controller = SessionController::new(service, Mode::Visualize);
//!
//!     controller.set_primary_image(ImageFile::load("living-room.jpg")?);
//!     controller.set_secondary_image(ImageFile::load("armchair.png")?);
//!     if let RunOutcome::Image(payload) = controller.run().await? {
//!         payload.to_file("result.png")?.save("result.png")?;
//!     }
//!
//!     // Keep refining the result without re-uploading it.
//!     controller.select_mode(Mode::Edit);
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini`: [`GeminiService`], the Gemini (Google) backend
//! - `cli`: the `dekoviz` command-line interface

mod error;
pub mod image;
pub mod progress;
pub mod providers;
mod service;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// Re-export error types at crate root
pub use error::{DekovizError, Result, ValidationError, UNKNOWN_ERROR_MESSAGE};

pub use image::{DataUri, ImageFile, ImageFormat, ImagePayload};
pub use service::ImageService;
pub use session::{
    Completion, Mode, PendingRun, RunOutcome, RunOutput, RunRequest, RunState, Session,
    SessionController, SessionId,
};

#[cfg(feature = "gemini")]
pub use providers::{GeminiModel, GeminiService, GeminiServiceBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{DekovizError, Result};
    pub use crate::image::{ImageFile, ImagePayload};
    pub use crate::service::ImageService;
    pub use crate::session::{Mode, RunOutcome, SessionController};

    #[cfg(feature = "gemini")]
    pub use crate::providers::GeminiService;
}
