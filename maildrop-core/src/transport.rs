//! The inbound and outbound transport worker loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use maildrop_engine::{Engine, SessionId, Transport};

/// Cooperative stop signal shared by both workers, checked at every loop
/// iteration boundary.
#[derive(Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The pair of transport worker threads for one session.
///
/// Each worker runs `idle → running → stopping → stopped`: it leaves
/// `running` only through [`stop`](Self::stop), never from inside its own
/// loop body. The engine-level interrupt is what frees a worker parked in
/// its blocking wait, so stop always interrupts after raising the token.
pub struct TransportWorkers {
    engine: Arc<dyn Engine>,
    session: SessionId,
    stop: StopToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TransportWorkers {
    pub fn new(engine: Arc<dyn Engine>, session: SessionId) -> Self {
        Self {
            engine,
            session,
            stop: StopToken::default(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the inbound and outbound workers on named threads.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        assert!(workers.is_empty(), "transport workers already started");
        for transport in [Transport::Inbound, Transport::Outbound] {
            let engine = Arc::clone(&self.engine);
            let stop = self.stop.clone();
            let session = self.session;
            let handle = std::thread::Builder::new()
                .name(transport.as_str().to_string())
                .spawn(move || run_worker(&*engine, session, transport, &stop))
                .expect("Failed to spawn transport worker");
            workers.push(handle);
        }
    }

    /// Raise the stop token, then unconditionally interrupt both
    /// transports' blocking waits so a parked worker observes the token
    /// at its next iteration boundary.
    ///
    /// Idempotent and safe in every state, including never-started. With
    /// `wait`, blocks until both worker threads have exited.
    pub fn stop(&self, wait: bool) {
        self.stop.trigger();
        // The interrupt must reach the engine even if a worker has not
        // yet entered its wait; the engine keeps it as a level signal.
        self.engine.interrupt_wait(self.session, Transport::Inbound);
        self.engine.interrupt_wait(self.session, Transport::Outbound);
        if wait {
            for handle in self.workers.lock().drain(..) {
                if handle.join().is_err() {
                    tracing::error!("transport worker panicked");
                }
            }
        }
    }
}

/// One worker loop. The wait step is the sole suspension point; errors in
/// individual work units are the engine's concern, the loop only retries
/// by looping.
fn run_worker(engine: &dyn Engine, session: SessionId, transport: Transport, stop: &StopToken) {
    tracing::debug!("{transport} worker for session {session} running");
    while !stop.is_triggered() {
        engine.perform_pending_jobs(session, transport);
        if transport == Transport::Inbound {
            engine.fetch_new(session);
        }
        engine.wait_for_work(session, transport);
    }
    tracing::debug!("{transport} worker for session {session} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use maildrop_engine::mem::MemEngine;

    fn workers() -> (Arc<MemEngine>, SessionId, TransportWorkers) {
        let engine = Arc::new(MemEngine::new());
        let session = engine.open(Path::new("/tmp/t.db")).unwrap();
        let workers = TransportWorkers::new(Arc::clone(&engine) as Arc<dyn Engine>, session);
        (engine, session, workers)
    }

    #[test]
    fn stop_before_start_is_a_noop() {
        let (_engine, _session, workers) = workers();
        workers.stop(true);
        workers.stop(true);
    }

    #[test]
    fn start_then_stop_joins_both_workers() {
        let (engine, session, workers) = workers();
        workers.start();
        workers.stop(true);
        // Both loops ran at least one round before parking.
        assert!(engine.jobs_performed(session, Transport::Inbound) >= 1);
        assert!(engine.jobs_performed(session, Transport::Outbound) >= 1);
        assert!(engine.fetch_count(session) >= 1);
    }

    #[test]
    fn stop_is_idempotent_while_running() {
        let (_engine, _session, workers) = workers();
        workers.start();
        workers.stop(false);
        workers.stop(true);
        workers.stop(true);
    }

    #[test]
    fn parked_worker_wakes_on_new_work() {
        let (engine, session, workers) = workers();
        workers.start();
        // Let both workers reach their wait step, then hand the inbound
        // side new work and watch it run another round.
        std::thread::sleep(Duration::from_millis(30));
        let before = engine.fetch_count(session);
        engine.interrupt_wait(session, Transport::Inbound);
        std::thread::sleep(Duration::from_millis(30));
        assert!(engine.fetch_count(session) > before);
        workers.stop(true);
    }

    #[test]
    #[should_panic(expected = "already started")]
    fn double_start_is_fatal() {
        let (_engine, _session, workers) = workers();
        workers.start();
        workers.start();
    }
}
