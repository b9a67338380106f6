//! Control layer for a maildrop messaging engine.
//!
//! Lets a host application drive an engine session: engine events are
//! routed through a [`CallbackRouter`] into a blocking, filterable
//! [`EventLog`], two worker threads drive the engine's inbound and
//! outbound transports, and [`Session`] ties the pieces together with a
//! shutdown path that interrupts before joining and releases the engine
//! session handle last.

use once_cell::sync::Lazy;

pub mod error;
pub mod event;
pub mod fetch;
pub mod handle;
pub mod log;
pub mod router;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use event::Event;
pub use handle::{Chat, Contact, Message};
pub use log::EventLog;
pub use router::CallbackRouter;
pub use session::Session;
pub use transport::{StopToken, TransportWorkers};

/// Shared tokio runtime for the blocking fetch helper.
pub(crate) static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .build()
        .expect("Failed to create tokio runtime")
});
