use thiserror::Error;

/// Dispatch failures surfaced to the caller.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A failure event finished dispatch without any handler processing it.
    #[error("no handler processed failure event: {event_type}")]
    UnhandledFailure { event_type: String },
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Error produced inside a callback or resolved handler object.
///
/// Handler errors never reach the caller of `raise` or `fail_with`; the
/// dispatcher reports them to its diagnostic sink and keeps going.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

pub type HandlerResult = Result<(), HandlerError>;
