//! Error taxonomy for the mixing engine.

pub type MixResult<T> = Result<T, MixError>;

#[derive(thiserror::Error, Debug)]
pub enum MixError {
    /// A lookup by identity matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The matching algorithm ran out of relaxation steps.
    #[error("no eligible content: {0}")]
    NoEligibleContent(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MixError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn no_eligible(msg: impl Into<String>) -> Self {
        Self::NoEligibleContent(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Collaborator-level failures the caller cannot fix by changing constraints.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(MixError::not_found("x").to_string().starts_with("not found:"));
        assert!(MixError::no_eligible("x")
            .to_string()
            .starts_with("no eligible content:"));
        assert!(MixError::invalid_argument("x")
            .to_string()
            .starts_with("invalid argument:"));
    }

    #[test]
    fn storage_classification() {
        let err: MixError = rusqlite::Error::InvalidQuery.into();
        assert!(err.is_storage_failure());
        assert!(!MixError::no_eligible("x").is_storage_failure());
    }
}
