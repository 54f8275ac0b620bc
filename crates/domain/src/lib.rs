pub mod clock;
pub mod config;
pub mod error;
pub mod session;
pub mod style;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use session::{
    Candidate, DepthAssessment, DepthClass, FinalStory, Session, SessionMetadata, SessionSnapshot,
    SessionStatus, SessionSummary, Stage, StoryElements, Turn, TurnRole,
};
pub use style::StoryStyle;
