use thiserror::Error;

/// Boxed cause carried by unexpected failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A recognised engine-level failure raised by invocation code.
///
/// Domain failures travel through `on_exception` unchanged; everything else
/// gets wrapped in [`InvocationError::Unexpected`].
#[derive(Debug, Clone, Error)]
#[error("{title}: {description}")]
pub struct DomainError {
    pub title: String,
    pub description: String,
}

impl DomainError {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Unexpected error: {0}")]
    Unexpected(#[source] BoxError),
}

impl InvocationError {
    /// Classify a raw failure: domain failures (and already classified errors)
    /// pass through, anything else is wrapped with its cause preserved.
    pub fn from_cause(err: anyhow::Error) -> Self {
        let err = match err.downcast::<InvocationError>() {
            Ok(classified) => return classified,
            Err(other) => other,
        };
        match err.downcast::<DomainError>() {
            Ok(domain) => InvocationError::Domain(domain),
            Err(other) => InvocationError::Unexpected(other.into()),
        }
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        InvocationError::Unexpected(msg.into())
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, InvocationError::Domain(_))
    }

    /// Short code used in log fields and status output.
    pub fn code(&self) -> &'static str {
        match self {
            InvocationError::Domain(_) => "DOMAIN_ERROR",
            InvocationError::Unexpected(_) => "UNEXPECTED_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, InvocationError>;
