//! Errors the engine reports across the contract boundary.

/// Failures an [`Engine`](crate::Engine) call can report.
///
/// Asynchronous failures (a configuration attempt going wrong, a send
/// bouncing) are not here — those surface as error events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("unknown session")]
    UnknownSession,
    #[error("unknown contact")]
    UnknownContact,
    #[error("unknown chat")]
    UnknownChat,
    #[error("unknown message")]
    UnknownMessage,
    #[error("unknown resource")]
    UnknownResource,
    #[error("resource is not of the requested kind")]
    WrongResourceKind,
    #[error("account is not configured")]
    NotConfigured,
    #[error("storage failure: {0}")]
    Storage(String),
}
