use crate::session::Stage;

/// Shared error type used across all StoryLoom crates.
///
/// The first seven variants are the wire-visible error kinds; the rest are
/// internal conditions that surface as `unavailable` at the HTTP boundary.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("invalid transition at stage {stage}: {message}")]
    InvalidTransition { stage: Stage, message: String },

    #[error("session expired: {0}")]
    Expired(String),

    #[error("generation timed out: {0}")]
    GenerationTimeout(String),

    #[error("generation incomplete: {0}")]
    GenerationIncomplete(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable kind string carried in every error response body.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::NotFound(_) => "not_found",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Expired(_) => "expired",
            Error::GenerationTimeout(_) => "generation_timeout",
            Error::GenerationIncomplete(_) => "generation_incomplete",
            Error::Unavailable(_) | Error::Config(_) | Error::Io(_) | Error::Json(_) => {
                "unavailable"
            }
        }
    }

    /// Helper for the common "wrong stage for this operation" rejection.
    pub fn invalid_transition(stage: Stage, message: impl Into<String>) -> Self {
        Error::InvalidTransition {
            stage,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_kinds_are_stable() {
        assert_eq!(Error::InvalidInput("x".into()).kind(), "invalid_input");
        assert_eq!(Error::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            Error::invalid_transition(Stage::Kickoff, "x").kind(),
            "invalid_transition"
        );
        assert_eq!(Error::Expired("x".into()).kind(), "expired");
        assert_eq!(
            Error::GenerationTimeout("x".into()).kind(),
            "generation_timeout"
        );
        assert_eq!(
            Error::GenerationIncomplete("x".into()).kind(),
            "generation_incomplete"
        );
        assert_eq!(Error::Unavailable("x".into()).kind(), "unavailable");
    }

    #[test]
    fn internal_errors_surface_as_unavailable() {
        assert_eq!(Error::Config("x".into()).kind(), "unavailable");
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.kind(), "unavailable");
    }
}
