//! Executors that promise events and background work are dispatched onto.
//!
//! The completion scheduler should be serial: the library's ordering
//! guarantees (progress in emission order, combinator bookkeeping without
//! interleaving) only hold when jobs run one at a time in submission order.
//! A concurrent scheduler is accepted, but callbacks then need their own
//! synchronization.
use crate::lock;
use std::{
    fmt::Debug,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        mpsc::{channel, Sender},
        Mutex,
    },
    thread::{self, ThreadId},
};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync + Debug {
    fn execute(&self, job: Job);

    /// Whether the caller is running on this scheduler's own thread.
    fn is_current(&self) -> bool {
        false
    }
}

/// A single worker thread fed by a channel. Jobs run in submission order.
///
/// The worker starts on the first [`Scheduler::execute`] and stops once the
/// queue is dropped and the channel drains.
#[derive(Debug)]
pub struct SerialQueue {
    name: String,
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    sender: Option<Sender<Job>>,
    thread: Option<ThreadId>,
}

impl SerialQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, state: &mut QueueState) -> Option<Sender<Job>> {
        let (tx, rx) = channel::<Job>();
        let name = self.name.clone();
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            tracing::debug!(queue = %name, "serial queue worker started");
            for job in rx {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!(queue = %name, "job panicked on serial queue");
                }
            }
            tracing::debug!(queue = %name, "serial queue worker stopped");
        });
        match spawned {
            Ok(handle) => {
                state.thread = Some(handle.thread().id());
                state.sender = Some(tx.clone());
                Some(tx)
            }
            Err(err) => {
                tracing::warn!(queue = %self.name, %err, "failed to spawn serial queue worker");
                None
            }
        }
    }
}

impl Scheduler for SerialQueue {
    fn execute(&self, job: Job) {
        let mut state = lock(&self.state);
        let sender = match state.sender.clone() {
            Some(sender) => Some(sender),
            None => self.start(&mut state),
        };
        drop(state);
        match sender {
            Some(sender) => {
                if let Err(returned) = sender.send(job) {
                    tracing::warn!(queue = %self.name, "serial queue worker is gone, running job inline");
                    (returned.0)()
                }
            }
            None => job(),
        }
    }

    fn is_current(&self) -> bool {
        lock(&self.state).thread == Some(thread::current().id())
    }
}

/// Runs every job immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl Scheduler for Inline {
    fn execute(&self, job: Job) {
        job()
    }
}

/// Runs every job on a fresh thread. Used for background work launched by
/// `spawn`; no ordering between jobs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl Scheduler for Detached {
    fn execute(&self, job: Job) {
        let job = std::sync::Arc::new(Mutex::new(Some(job)));
        let fallback = job.clone();
        let spawned = thread::Builder::new()
            .name("promise-kit.background".into())
            .spawn(move || {
                if let Some(job) = lock(&job).take() {
                    job()
                }
            });
        if let Err(err) = spawned {
            tracing::warn!(%err, "failed to spawn background thread, running job inline");
            if let Some(job) = lock(&fallback).take() {
                job()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Detached, Inline, Scheduler, SerialQueue};
    use std::sync::{mpsc::channel, Arc};

    #[test]
    fn test_serial_queue_preserves_order() {
        let queue = SerialQueue::new("test.serial");
        let (tx, rx) = channel();
        for i in 0..100 {
            let tx = tx.clone();
            queue.execute(Box::new(move || tx.send(i).unwrap()));
        }
        let received: Vec<i32> = rx.iter().take(100).collect();
        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_serial_queue_is_current() {
        let queue = Arc::new(SerialQueue::new("test.current"));
        assert!(!queue.is_current());
        let (tx, rx) = channel();
        let inner = queue.clone();
        queue.execute(Box::new(move || tx.send(inner.is_current()).unwrap()));
        assert!(rx.recv().unwrap());
    }

    #[test]
    fn test_serial_queue_survives_panicking_job() {
        let queue = SerialQueue::new("test.panic");
        queue.execute(Box::new(|| panic!("job failure")));
        let (tx, rx) = channel();
        queue.execute(Box::new(move || tx.send(7).unwrap()));
        assert_eq!(rx.recv().unwrap(), 7);
    }

    #[test]
    fn test_inline_runs_immediately() {
        let (tx, rx) = channel();
        Inline.execute(Box::new(move || tx.send(1).unwrap()));
        assert_eq!(rx.try_recv().unwrap(), 1);
    }

    #[test]
    fn test_detached_runs_off_thread() {
        let (tx, rx) = channel();
        let caller = std::thread::current().id();
        Detached.execute(Box::new(move || tx.send(std::thread::current().id()).unwrap()));
        assert_ne!(rx.recv().unwrap(), caller);
    }
}
