use thiserror::Error;

/// Errors returned by handler registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("Handler with id {0} already exists")]
    DuplicateHandlerId(String),

    #[error("Handler with id {0} is not registered")]
    UnknownHandlerId(String),
}

/// Failure of a single poll cycle. Logged by the listener, never fatal.
pub type PollError = anyhow::Error;
