//! Names of the events the engine emits.
//!
//! Part of the contract: sinks dispatch on these strings, and the control
//! layer's event log promotes [`ERROR`] to a failure when asked to.

/// Something went wrong engine-side. `data1` carries a numeric code,
/// `data2` a human-readable description.
pub const ERROR: &str = "ERROR";

/// Informational engine log line in `data2`.
pub const INFO: &str = "INFO";

/// Warning engine log line in `data2`.
pub const WARNING: &str = "WARNING";

/// The engine asks the host to fetch a URL (`data1`) and expects the body
/// bytes as the reply.
pub const HTTP_GET: &str = "HTTP_GET";

/// The engine asks whether the host currently considers itself offline;
/// a non-zero reply suppresses send attempts.
pub const IS_OFFLINE: &str = "IS_OFFLINE";

/// Configuration progress: `data1` is a permille value, 1000 means done.
pub const CONFIGURE_PROGRESS: &str = "CONFIGURE_PROGRESS";

/// A new message arrived: `data1` is the chat id, `data2` the message id.
pub const INCOMING_MSG: &str = "INCOMING_MSG";

/// An outgoing message left the outbox: `data1` is the chat id, `data2`
/// the message id.
pub const MSG_DELIVERED: &str = "MSG_DELIVERED";
