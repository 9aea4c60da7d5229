//! Session state types.

use crate::image::{ImageFile, ImagePayload};
use serde::{Deserialize, Serialize};

/// The operation a session is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Place a furniture model into a room photo.
    Visualize,
    /// Generate an image from text.
    Generate,
    /// Edit an uploaded or previously produced image.
    Edit,
    /// Ask a question about an uploaded image.
    Analyze,
}

impl Mode {
    /// All modes, in display order.
    pub const ALL: [Mode; 4] = [Self::Visualize, Self::Generate, Self::Edit, Self::Analyze];

    /// Returns the display label of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visualize => "Visualize",
            Self::Generate => "Generate",
            Self::Edit => "Edit",
            Self::Analyze => "Analyze",
        }
    }

    /// Returns true if a successful run in this mode produces an image.
    pub fn produces_image(&self) -> bool {
        !matches!(self, Self::Analyze)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one mode activation.
///
/// Every `select_mode` and `start_over` yields a new id, so results tagged
/// with an older id can be recognized as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a session is in its run cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// One external call is in flight.
    Running,
    /// The last run failed; the error is kept until the next run or reset.
    Errored,
}

/// Mutable state for the active mode.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) mode: Mode,
    pub(crate) primary_image: Option<ImageFile>,
    pub(crate) secondary_image: Option<ImageFile>,
    pub(crate) produced_image: Option<ImagePayload>,
    pub(crate) prompt: String,
    pub(crate) state: RunState,
    pub(crate) error: Option<String>,
}

impl Session {
    pub(crate) fn new(id: SessionId, mode: Mode) -> Self {
        Self {
            id,
            mode,
            primary_image: None,
            secondary_image: None,
            produced_image: None,
            prompt: String::new(),
            state: RunState::Idle,
            error: None,
        }
    }

    /// Returns the session identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the mode this session is scoped to.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The uploaded image: the room in Visualize, the subject elsewhere.
    pub fn primary_image(&self) -> Option<&ImageFile> {
        self.primary_image.as_ref()
    }

    /// The furniture model image (Visualize only).
    pub fn secondary_image(&self) -> Option<&ImageFile> {
        self.secondary_image.as_ref()
    }

    /// The most recent image returned by a successful run.
    pub fn produced_image(&self) -> Option<&ImagePayload> {
        self.produced_image.as_ref()
    }

    /// The prompt as last set.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Returns true while an external call is in flight.
    pub fn is_loading(&self) -> bool {
        self.state == RunState::Running
    }

    /// The message of the last failed run, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
