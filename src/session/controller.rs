//! The mode session controller.

use crate::error::{DekovizError, Result, ValidationError};
use crate::image::{ImageFile, ImagePayload};
use crate::service::ImageService;
use crate::session::types::{Mode, RunState, Session, SessionId};
use std::sync::Arc;

/// File name given to a produced image when it is sent back for editing.
pub const LAST_GENERATED_FILE_NAME: &str = "last-generated.png";

/// The single external call a run performs, with its validated inputs.
#[derive(Debug, Clone)]
pub enum RunRequest {
    /// `visualize(environment, model)`
    Visualize {
        /// Photo of the room.
        environment: ImageFile,
        /// Photo of the furniture to place.
        model: ImageFile,
    },
    /// `generate(prompt)`
    Generate {
        /// Description of the image to create.
        prompt: String,
    },
    /// `edit(image, prompt)`
    Edit {
        /// The produced image if there is one, else the upload.
        image: ImageFile,
        /// Edit instructions.
        prompt: String,
    },
    /// `analyze(image, prompt)`
    Analyze {
        /// The uploaded image.
        image: ImageFile,
        /// Question about the image.
        prompt: String,
    },
}

/// What a successful external call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutput {
    /// A new image.
    Image(ImagePayload),
    /// Analysis text.
    Analysis(String),
}

/// The effect of applying a [`Completion`] to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The produced image was replaced.
    Image(ImagePayload),
    /// Analysis text, not stored in the session.
    Analysis(String),
    /// The session the run belonged to was replaced; nothing was applied.
    Discarded,
}

/// A validated run, detached from the controller while its call is in flight.
pub struct PendingRun {
    session: SessionId,
    request: RunRequest,
    service: Arc<dyn ImageService>,
}

impl PendingRun {
    /// The session this run was issued for.
    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// The call this run will make.
    pub fn request(&self) -> &RunRequest {
        &self.request
    }

    /// Performs the external call.
    pub async fn execute(self) -> Completion {
        let result = match &self.request {
            RunRequest::Visualize { environment, model } => self
                .service
                .visualize(environment, model)
                .await
                .map(RunOutput::Image),
            RunRequest::Generate { prompt } => {
                self.service.generate(prompt).await.map(RunOutput::Image)
            }
            RunRequest::Edit { image, prompt } => {
                self.service.edit(image, prompt).await.map(RunOutput::Image)
            }
            RunRequest::Analyze { image, prompt } => self
                .service
                .analyze(image, prompt)
                .await
                .map(RunOutput::Analysis),
        };

        Completion {
            session: self.session,
            result,
        }
    }
}

/// The result of a [`PendingRun`], tagged with the session it was issued for.
#[derive(Debug)]
pub struct Completion {
    session: SessionId,
    result: Result<RunOutput>,
}

impl Completion {
    /// The session the run was issued for.
    pub fn session_id(&self) -> SessionId {
        self.session
    }
}

/// Owns the live [`Session`] and performs all mutations on it.
pub struct SessionController {
    service: Arc<dyn ImageService>,
    session: Session,
    next_id: u64,
}

impl SessionController {
    /// Creates a controller with a fresh session in `mode`.
    pub fn new(service: Arc<dyn ImageService>, mode: Mode) -> Self {
        Self {
            service,
            session: Session::new(SessionId(0), mode),
            next_id: 1,
        }
    }

    /// The live session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The mode of the live session.
    pub fn mode(&self) -> Mode {
        self.session.mode
    }

    /// Replaces the session with a fresh one scoped to `mode`.
    pub fn select_mode(&mut self, mode: Mode) {
        let id = SessionId(self.next_id);
        self.next_id += 1;

        if self.session.is_loading() {
            tracing::debug!(
                previous = %self.session.id,
                "session replaced while a run was in flight"
            );
        }
        tracing::info!(session = %id, mode = %mode, "mode selected");
        self.session = Session::new(id, mode);
    }

    /// Discards all inputs and outputs, keeping the current mode.
    pub fn start_over(&mut self) {
        self.select_mode(self.session.mode);
    }

    /// Sets the room photo in Visualize, the subject image elsewhere.
    pub fn set_primary_image(&mut self, image: ImageFile) {
        self.session.primary_image = Some(image);
    }

    /// Sets the furniture model image used by Visualize.
    pub fn set_secondary_image(&mut self, image: ImageFile) {
        self.session.secondary_image = Some(image);
    }

    /// Replaces the prompt. No length limit.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.session.prompt = prompt.into();
    }

    /// Label for the run action in the current state.
    pub fn run_label(&self) -> String {
        if self.session.is_loading() {
            "Processing...".to_string()
        } else if self.session.produced_image.is_some() && self.session.mode.produces_image() {
            "Modify Image".to_string()
        } else {
            format!("Run {}", self.session.mode)
        }
    }

    /// Validates the inputs and moves the session to [`RunState::Running`].
    ///
    /// Returns [`DekovizError::Busy`] without touching the session if a run is
    /// already in flight. Any other error is recorded on the session.
    pub fn begin_run(&mut self) -> Result<PendingRun> {
        if self.session.is_loading() {
            tracing::debug!(session = %self.session.id, "run rejected: already running");
            return Err(DekovizError::Busy);
        }

        self.session.error = None;
        self.session.state = RunState::Idle;

        // Only an edit, or a visualize refining its own result, keeps the
        // produced image; everything else drops it on entry.
        let keep_produced = match self.session.mode {
            Mode::Edit => true,
            Mode::Visualize => self.session.produced_image.is_some(),
            Mode::Generate | Mode::Analyze => false,
        };
        if !keep_produced {
            self.session.produced_image = None;
        }

        let request = match self.build_request() {
            Ok(request) => request,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        self.session.state = RunState::Running;
        tracing::debug!(session = %self.session.id, mode = %self.session.mode, "run started");

        Ok(PendingRun {
            session: self.session.id,
            request,
            service: Arc::clone(&self.service),
        })
    }

    /// Applies a finished run if it belongs to the live session.
    ///
    /// Failures are recorded on the session and returned.
    pub fn complete(&mut self, completion: Completion) -> Result<RunOutcome> {
        if completion.session != self.session.id || !self.session.is_loading() {
            tracing::debug!(
                run_session = %completion.session,
                live_session = %self.session.id,
                "discarding stale run result"
            );
            return Ok(RunOutcome::Discarded);
        }

        match completion.result {
            Ok(RunOutput::Image(payload)) => {
                self.session.state = RunState::Idle;
                self.session.produced_image = Some(payload.clone());
                self.session.prompt.clear();
                tracing::debug!(session = %self.session.id, "run produced an image");
                Ok(RunOutcome::Image(payload))
            }
            Ok(RunOutput::Analysis(text)) => {
                self.session.state = RunState::Idle;
                tracing::debug!(session = %self.session.id, chars = text.len(), "run produced analysis");
                Ok(RunOutcome::Analysis(text))
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Validates, performs the external call and applies its result.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let pending = self.begin_run()?;
        let completion = pending.execute().await;
        self.complete(completion)
    }

    fn fail(&mut self, error: &DekovizError) {
        let message = error.user_message();
        tracing::warn!(session = %self.session.id, mode = %self.session.mode, "run failed: {message}");
        self.session.state = RunState::Errored;
        self.session.error = Some(message);
    }

    fn build_request(&self) -> Result<RunRequest> {
        let session = &self.session;
        let prompt = session.prompt.clone();

        match session.mode {
            Mode::Visualize => match (&session.primary_image, &session.secondary_image) {
                (Some(environment), Some(model)) => Ok(RunRequest::Visualize {
                    environment: environment.clone(),
                    model: model.clone(),
                }),
                _ => Err(ValidationError::MissingVisualizeImages.into()),
            },
            Mode::Edit => {
                let image = match (&session.produced_image, &session.primary_image) {
                    (Some(produced), _) => produced.to_file(LAST_GENERATED_FILE_NAME)?,
                    (None, Some(uploaded)) => uploaded.clone(),
                    (None, None) => return Err(ValidationError::MissingEditImage.into()),
                };
                if prompt.is_empty() {
                    return Err(ValidationError::MissingEditPrompt.into());
                }
                Ok(RunRequest::Edit { image, prompt })
            }
            Mode::Generate => {
                if prompt.is_empty() {
                    return Err(ValidationError::MissingGeneratePrompt.into());
                }
                Ok(RunRequest::Generate { prompt })
            }
            Mode::Analyze => {
                let image = session
                    .primary_image
                    .clone()
                    .ok_or(ValidationError::MissingAnalyzeImage)?;
                if prompt.is_empty() {
                    return Err(ValidationError::MissingAnalyzePrompt.into());
                }
                Ok(RunRequest::Analyze { image, prompt })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UNKNOWN_ERROR_MESSAGE;
    use crate::testing::{png_file, Call, MockService};

    fn controller(mode: Mode) -> (SessionController, Arc<MockService>) {
        let service = Arc::new(MockService::new());
        let controller = SessionController::new(service.clone(), mode);
        (controller, service)
    }

    #[tokio::test]
    async fn test_missing_inputs_never_call_service() {
        let cases: [(Mode, fn(&mut SessionController), &str); 6] = [
            (
                Mode::Visualize,
                |c| c.set_primary_image(png_file("room.png")),
                "Please upload both an environment and a model image.",
            ),
            (
                Mode::Edit,
                |c| c.set_prompt("darken wood"),
                "Please upload an image to edit.",
            ),
            (
                Mode::Edit,
                |c| c.set_primary_image(png_file("table.png")),
                "Please enter a prompt to edit the image.",
            ),
            (
                Mode::Generate,
                |_| {},
                "Please enter a prompt to generate an image.",
            ),
            (
                Mode::Analyze,
                |c| c.set_prompt("What wood is this?"),
                "Please upload an image to analyze.",
            ),
            (
                Mode::Analyze,
                |c| c.set_primary_image(png_file("chair.png")),
                "Please enter a prompt to analyze the image.",
            ),
        ];

        for (mode, setup, expected) in cases {
            let (mut c, service) = controller(mode);
            setup(&mut c);

            let err = c.run().await.unwrap_err();
            assert!(err.is_validation(), "{mode}: {err:?}");
            assert_eq!(err.to_string(), expected);
            assert_eq!(c.session().error(), Some(expected));
            assert_eq!(c.session().state(), RunState::Errored);
            assert!(service.calls().is_empty(), "{mode} called the service");
        }
    }

    #[tokio::test]
    async fn test_generate_sets_image_and_clears_prompt() {
        let (mut c, service) = controller(Mode::Generate);
        c.set_prompt("red chair");

        let outcome = c.run().await.unwrap();

        assert_eq!(
            service.calls(),
            vec![Call::Generate {
                prompt: "red chair".into()
            }]
        );
        assert_eq!(outcome, RunOutcome::Image(service.image_payload()));
        assert_eq!(c.session().produced_image(), Some(&service.image_payload()));
        assert_eq!(c.session().prompt(), "");
        assert_eq!(c.session().state(), RunState::Idle);
        assert_eq!(c.run_label(), "Modify Image");
    }

    #[tokio::test]
    async fn test_edit_chains_on_produced_image() {
        let (mut c, service) = controller(Mode::Edit);
        c.set_primary_image(png_file("table.png"));
        c.set_prompt("add a vase");
        c.run().await.unwrap();
        let first = c.session().produced_image().cloned().unwrap();

        service.set_image_reply(ImagePayload::from_base64("image/jpeg", "/9j/4A=="));
        c.set_prompt("darken wood");
        let outcome = c.run().await.unwrap();

        let calls = service.calls();
        assert_eq!(calls.len(), 2);
        match &calls[1] {
            Call::Edit { image, prompt } => {
                let expected = first.to_file(LAST_GENERATED_FILE_NAME).unwrap();
                assert_eq!(image, &expected);
                assert_eq!(prompt, "darken wood");
            }
            other => panic!("expected edit call, got {other:?}"),
        }
        let second = ImagePayload::from_base64("image/jpeg", "/9j/4A==");
        assert_eq!(outcome, RunOutcome::Image(second.clone()));
        assert_eq!(c.session().produced_image(), Some(&second));
    }

    #[tokio::test]
    async fn test_edit_uses_upload_when_nothing_produced() {
        let (mut c, service) = controller(Mode::Edit);
        c.set_primary_image(png_file("table.png"));
        c.set_prompt("retro filter");
        c.run().await.unwrap();

        assert_eq!(
            service.calls(),
            vec![Call::Edit {
                image: png_file("table.png"),
                prompt: "retro filter".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_edit_with_malformed_produced_image_fails_before_call() {
        let (mut c, service) = controller(Mode::Edit);
        service.set_image_reply(ImagePayload::new("data:;base64,AAAA"));
        c.set_primary_image(png_file("table.png"));
        c.set_prompt("first pass");
        c.run().await.unwrap();

        c.set_prompt("second pass");
        let err = c.run().await.unwrap_err();

        assert!(matches!(err, DekovizError::InvalidDataUri(_)));
        assert!(c.session().error().unwrap().starts_with("Invalid data URL"));
        assert_eq!(service.calls().len(), 1);
        // The malformed image stays; nothing was applied.
        assert_eq!(
            c.session().produced_image().map(ImagePayload::as_str),
            Some("data:;base64,AAAA")
        );
    }

    #[tokio::test]
    async fn test_visualize_requires_both_images() {
        let (mut c, service) = controller(Mode::Visualize);
        c.set_primary_image(png_file("room.png"));

        let err = c.run().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please upload both an environment and a model image."
        );
        assert!(service.calls().is_empty());

        c.set_secondary_image(png_file("sofa.png"));
        c.run().await.unwrap();
        assert_eq!(
            service.calls(),
            vec![Call::Visualize {
                environment: png_file("room.png"),
                model: png_file("sofa.png"),
            }]
        );
        assert!(c.session().error().is_none());
    }

    #[tokio::test]
    async fn test_analyze_leaves_produced_image_alone() {
        let (mut c, service) = controller(Mode::Analyze);
        c.set_primary_image(png_file("chair.png"));
        c.set_prompt("What materials are used in this chair?");

        let outcome = c.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Analysis(service.text_reply()));
        assert_eq!(
            service.calls(),
            vec![Call::Analyze {
                image: png_file("chair.png"),
                prompt: "What materials are used in this chair?".into()
            }]
        );
        assert!(c.session().produced_image().is_none());
        assert_eq!(c.session().prompt(), "What materials are used in this chair?");
        assert_eq!(c.run_label(), "Run Analyze");
    }

    #[tokio::test]
    async fn test_retention_policy() {
        // Visualize keeps the image it is refining until replaced.
        let (mut c, service) = controller(Mode::Visualize);
        c.set_primary_image(png_file("room.png"));
        c.set_secondary_image(png_file("sofa.png"));
        c.run().await.unwrap();

        let pending = c.begin_run().unwrap();
        assert!(c.session().produced_image().is_some());
        drop(pending);

        // Generate clears it before the call.
        let (mut c, _) = controller(Mode::Generate);
        c.set_prompt("oak bench");
        c.run().await.unwrap();
        c.set_prompt("pine bench");
        let pending = c.begin_run().unwrap();
        assert!(c.session().produced_image().is_none());
        drop(pending);

        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_validation_still_drops_produced_image() {
        let (mut c, service) = controller(Mode::Generate);
        c.set_prompt("oak bench");
        c.run().await.unwrap();
        assert!(c.session().produced_image().is_some());
        assert_eq!(c.session().prompt(), "");

        let err = c.run().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please enter a prompt to generate an image."
        );
        assert!(c.session().produced_image().is_none());
        assert_eq!(c.session().state(), RunState::Errored);
        assert_eq!(service.calls().len(), 1);

        // Edit keeps its image even when the prompt is missing.
        let (mut c, _) = controller(Mode::Edit);
        c.set_primary_image(png_file("table.png"));
        c.set_prompt("add a vase");
        c.run().await.unwrap();
        let err = c.run().await.unwrap_err();
        assert!(err.is_validation());
        assert!(c.session().produced_image().is_some());
    }

    #[tokio::test]
    async fn test_failure_keeps_produced_image_and_records_message() {
        let (mut c, service) = controller(Mode::Edit);
        c.set_primary_image(png_file("table.png"));
        c.set_prompt("add legs");
        c.run().await.unwrap();
        let produced = c.session().produced_image().cloned();

        service.fail_with("quota exhausted");
        c.set_prompt("add more legs");
        let err = c.run().await.unwrap_err();

        assert_eq!(err.to_string(), "API error: 500 - quota exhausted");
        assert_eq!(c.session().error(), Some("API error: 500 - quota exhausted"));
        assert_eq!(c.session().state(), RunState::Errored);
        assert_eq!(c.session().produced_image().cloned(), produced);
        assert_eq!(c.session().prompt(), "add more legs");

        // The next attempt clears the error.
        service.succeed();
        c.run().await.unwrap();
        assert!(c.session().error().is_none());
        assert_eq!(c.session().state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_blank_failure_message_falls_back() {
        let (mut c, service) = controller(Mode::Generate);
        service.fail_with("");
        c.set_prompt("stool");
        c.run().await.unwrap_err();
        assert_eq!(c.session().error(), Some(UNKNOWN_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn test_run_while_running_is_rejected() {
        let (mut c, service) = controller(Mode::Generate);
        c.set_prompt("lamp");

        let pending = c.begin_run().unwrap();
        assert!(c.session().is_loading());
        assert_eq!(c.run_label(), "Processing...");

        let err = c.begin_run().err().unwrap();
        assert!(matches!(err, DekovizError::Busy));
        let err = c.run().await.unwrap_err();
        assert!(matches!(err, DekovizError::Busy));
        assert!(c.session().error().is_none());

        let completion = pending.execute().await;
        c.complete(completion).unwrap();
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_yields_empty_session() {
        let (mut c, service) = controller(Mode::Edit);
        c.set_primary_image(png_file("table.png"));
        c.set_prompt("stain it");
        c.run().await.unwrap();
        service.fail_with("boom");
        c.set_prompt("again");
        c.run().await.unwrap_err();
        let before = c.session().id();

        c.start_over();
        let session = c.session();
        assert_eq!(session.mode(), Mode::Edit);
        assert_ne!(session.id(), before);
        assert!(session.primary_image().is_none());
        assert!(session.produced_image().is_none());
        assert!(session.prompt().is_empty());
        assert!(session.error().is_none());
        assert!(!session.is_loading());

        for mode in Mode::ALL {
            c.set_secondary_image(png_file("sofa.png"));
            c.set_prompt("x");
            c.select_mode(mode);
            let session = c.session();
            assert_eq!(session.mode(), mode);
            assert!(session.secondary_image().is_none());
            assert!(session.prompt().is_empty());
            assert_eq!(session.state(), RunState::Idle);
        }
    }

    #[tokio::test]
    async fn test_late_result_after_mode_change_is_discarded() {
        let (mut c, service) = controller(Mode::Generate);
        c.set_prompt("desk");
        let pending = c.begin_run().unwrap();

        c.select_mode(Mode::Analyze);
        assert!(!c.session().is_loading());

        let completion = pending.execute().await;
        assert_eq!(c.complete(completion).unwrap(), RunOutcome::Discarded);
        assert!(c.session().produced_image().is_none());
        assert_eq!(c.session().mode(), Mode::Analyze);
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_late_failure_after_start_over_is_discarded() {
        let (mut c, service) = controller(Mode::Generate);
        service.fail_with("timeout");
        c.set_prompt("shelf");
        let pending = c.begin_run().unwrap();

        c.start_over();
        c.set_prompt("cabinet");
        let fresh = c.begin_run().unwrap();

        // The old call fails after the new one started.
        let stale = tokio::spawn(pending.execute()).await.unwrap();
        assert_eq!(c.complete(stale).unwrap(), RunOutcome::Discarded);
        assert!(c.session().is_loading());
        assert!(c.session().error().is_none());

        service.succeed();
        let completion = fresh.execute().await;
        assert!(matches!(
            c.complete(completion).unwrap(),
            RunOutcome::Image(_)
        ));
    }
}
