//! Dispatcher - the single dispatch thread

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, instrument};

use contracts::ContractError;

use crate::queue::EventQueue;

/// How long the dispatch thread waits for an event before re-checking its stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(20);

thread_local! {
    static ON_DISPATCH_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Whether the caller runs on a dispatch thread
///
/// Push callbacks run there; lifecycle operations issued from it would wait on
/// themselves.
pub fn on_dispatch_thread() -> bool {
    ON_DISPATCH_THREAD.with(Cell::get)
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns the dispatch thread draining an [`EventQueue`]
pub struct Dispatcher {
    queue: Arc<EventQueue>,
    worker: Option<Worker>,
}

impl Dispatcher {
    /// Create a stopped dispatcher over `queue`
    pub fn new(queue: Arc<EventQueue>) -> Self {
        Self {
            queue,
            worker: None,
        }
    }

    /// The queue being drained
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Whether the dispatch thread is alive
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Spawn the dispatch thread; no-op if already running
    #[instrument(name = "dispatcher_start", skip(self))]
    pub fn start(&mut self) -> Result<(), ContractError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        let queue = Arc::clone(&self.queue);
        let flag = Arc::clone(&running);
        let handle = std::thread::Builder::new()
            .name("dispatch".to_string())
            .spawn(move || dispatch_loop(queue, flag))?;

        self.worker = Some(Worker { running, handle });
        Ok(())
    }

    /// Stop the dispatch thread and wait for it to exit
    ///
    /// An event being delivered completes first. Pending events stay queued.
    #[instrument(name = "dispatcher_stop", skip(self))]
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.running.store(false, Ordering::Release);
        self.queue.wake_all();

        if worker.handle.thread().id() == std::thread::current().id() {
            // Joining ourselves would never return
            error!("Dispatcher stopped from its own thread, not joining");
            return;
        }
        if worker.handle.join().is_err() {
            error!("Dispatch thread panicked");
        }
        debug!("Dispatcher stop complete");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(queue: Arc<EventQueue>, running: Arc<AtomicBool>) {
    ON_DISPATCH_THREAD.with(|flag| flag.set(true));
    info!("Dispatcher started");

    let mut delivered: u64 = 0;
    while running.load(Ordering::Acquire) {
        let Some(event) = queue.pop_blocking(POLL_INTERVAL) else {
            continue;
        };

        let kind = event.kind();
        let wait_ms = event.waited().as_secs_f64() * 1000.0;
        let port = event.port();

        // A panicking receiver must not take the dispatch thread down
        if catch_unwind(AssertUnwindSafe(|| event.deliver())).is_err() {
            error!(kind = %kind, ?port, "Receiver panicked during delivery");
        }

        queue.metrics().inc_delivered();
        observability::record_event_delivered(kind, wait_ms);
        observability::record_queue_depth(queue.metrics().queue_len());

        delivered += 1;
        if delivered.is_multiple_of(1000) {
            debug!(events = delivered, "Dispatcher progress");
        }
    }

    info!(events = delivered, "Dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::MeasurementKind;
    use std::sync::mpsc;

    #[test]
    fn test_start_deliver_stop() {
        let queue = Arc::new(EventQueue::new());
        let port = queue.register_port("p", MeasurementKind::Pose, None);
        let mut dispatcher = Dispatcher::new(Arc::clone(&queue));

        dispatcher.start().unwrap();
        dispatcher.start().unwrap();
        assert!(dispatcher.is_running());

        let (tx, rx) = mpsc::channel();
        for i in 0..5u32 {
            let tx = tx.clone();
            queue.enqueue(port, i as u64, Box::new(move || tx.send(i).unwrap()));
        }

        let got: Vec<u32> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);

        dispatcher.stop();
        assert!(!dispatcher.is_running());
        assert_eq!(queue.metrics().delivered(), 5);
    }

    #[test]
    fn test_delivery_runs_on_dispatch_thread() {
        let queue = Arc::new(EventQueue::new());
        let port = queue.register_port("p", MeasurementKind::Pose, None);
        let mut dispatcher = Dispatcher::new(Arc::clone(&queue));
        dispatcher.start().unwrap();

        let (tx, rx) = mpsc::channel();
        queue.enqueue(port, 0, Box::new(move || tx.send(on_dispatch_thread()).unwrap()));

        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(!on_dispatch_thread());
    }

    #[test]
    fn test_panicking_receiver_does_not_stop_dispatch() {
        let queue = Arc::new(EventQueue::new());
        let port = queue.register_port("p", MeasurementKind::Pose, None);
        let mut dispatcher = Dispatcher::new(Arc::clone(&queue));
        dispatcher.start().unwrap();

        let (tx, rx) = mpsc::channel();
        queue.enqueue(port, 0, Box::new(|| panic!("receiver failure")));
        queue.enqueue(port, 1, Box::new(move || tx.send(()).unwrap()));

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        dispatcher.stop();
    }

    #[test]
    fn test_stopped_dispatcher_leaves_events_queued() {
        let queue = Arc::new(EventQueue::new());
        let port = queue.register_port("p", MeasurementKind::Pose, None);
        let mut dispatcher = Dispatcher::new(Arc::clone(&queue));
        dispatcher.start().unwrap();
        dispatcher.stop();

        queue.enqueue(port, 0, Box::new(|| {}));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.len(), 1);
    }
}
