//! Errors surfaced by the control layer.

use maildrop_engine::{EngineError, EventData};

/// Failures a control-layer call can return.
///
/// Invariant violations — a callback routed to the wrong session, a
/// session used after shutdown — are not represented here: they are
/// programming errors and panic instead of being handed to callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No event arrived within the wait bound. Recoverable; the caller
    /// decides whether to retry.
    #[error("timed out waiting for an event")]
    Timeout,

    /// The engine reported an error event. Surfaced to the caller, never
    /// retried automatically.
    #[error("engine error event: {name}({data1}, {data2})")]
    Protocol {
        name: String,
        data1: EventData,
        data2: EventData,
    },

    /// The event-name pattern given to a filtered read did not compile.
    #[error("invalid event name pattern")]
    Pattern(#[from] regex::Error),

    /// The engine rejected a call.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, Error>;
