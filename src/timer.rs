//! Deferred jobs for `delay`, `timeout` and `retry`.
//!
//! A single worker thread sleeps on a condition variable until the earliest
//! deadline, then runs every due job. Jobs sharing a deadline run in the order
//! they were scheduled. Nothing here blocks the thread that schedules a job.
//! Jobs scheduled before the last handle is dropped still run.
use crate::{lock, scheduler::Job};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Condvar, Mutex},
    thread,
    time::{Duration, Instant},
};

pub struct Timer {
    shared: Arc<Shared>,
}

struct Shared {
    name: String,
    queue: Mutex<TimerQueue>,
    condvar: Condvar,
}

#[derive(Default)]
struct TimerQueue {
    jobs: BTreeMap<Key, Job>,
    next_seq: u64,
    running: bool,
    shutdown: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    deadline: Instant,
    seq: u64,
}

impl Timer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                queue: Mutex::new(TimerQueue::default()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Runs `job` on the timer thread once `after` has elapsed.
    pub fn schedule(&self, after: Duration, job: Job) {
        let deadline = Instant::now() + after;
        let mut queue = lock(&self.shared.queue);
        if !queue.running && !self.start() {
            drop(queue);
            self.sleep_detached(after, job);
            return;
        }
        queue.running = true;
        let key = Key {
            deadline,
            seq: queue.next_seq,
        };
        queue.next_seq += 1;
        let earliest = queue.jobs.first_key_value().map_or(true, |(first, _)| key < *first);
        queue.jobs.insert(key, job);
        tracing::trace!(timer = %self.shared.name, ?after, pending = queue.jobs.len(), "scheduled timer job");
        drop(queue);
        if earliest {
            self.shared.condvar.notify_one();
        }
    }

    /// Number of jobs still waiting for their deadline.
    pub fn pending(&self) -> usize {
        lock(&self.shared.queue).jobs.len()
    }

    fn sleep_detached(&self, after: Duration, job: Job) {
        let job = Arc::new(Mutex::new(Some(job)));
        let pending = job.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}.sleeper", self.shared.name))
            .spawn(move || {
                thread::sleep(after);
                if let Some(job) = lock(&pending).take() {
                    job()
                }
            });
        match spawned {
            Ok(_) => {
                tracing::warn!(timer = %self.shared.name, "timer worker unavailable, sleeping on a detached thread")
            }
            Err(err) => {
                lock(&job).take();
                tracing::error!(timer = %self.shared.name, %err, "no thread for timer job, dropping it");
            }
        }
    }

    fn start(&self) -> bool {
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || shared.run_worker());
        match spawned {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(timer = %self.shared.name, %err, "failed to spawn timer worker");
                false
            }
        }
    }
}

impl Shared {
    fn run_worker(&self) {
        tracing::debug!(timer = %self.name, "timer worker started");
        let mut due = Vec::new();
        let mut queue = lock(&self.queue);
        loop {
            if queue.shutdown && queue.jobs.is_empty() {
                break;
            }
            let now = Instant::now();
            while let Some(entry) = queue.jobs.first_entry() {
                if entry.key().deadline > now {
                    break;
                }
                due.push(entry.remove());
            }
            if !due.is_empty() {
                drop(queue);
                for job in due.drain(..) {
                    job();
                }
                queue = lock(&self.queue);
                continue;
            }
            let next = queue.jobs.first_key_value().map(|(key, _)| key.deadline);
            queue = match next {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(now);
                    self.condvar
                        .wait_timeout(queue, wait)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0)
                }
                None => self
                    .condvar
                    .wait(queue)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            };
        }
        queue.running = false;
        tracing::debug!(timer = %self.name, "timer worker stopped");
    }
}

impl Drop for Timer {
    /// Stops the worker once every job already scheduled has run.
    fn drop(&mut self) {
        lock(&self.shared.queue).shutdown = true;
        self.shared.condvar.notify_all();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.shared.name)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Timer;
    use std::{
        sync::mpsc::channel,
        time::{Duration, Instant},
    };

    #[test]
    fn test_fires_in_deadline_order() {
        let timer = Timer::new("test.timer.order");
        let (tx, rx) = channel();
        for (label, ms) in [("c", 60), ("a", 10), ("b", 30)] {
            let tx = tx.clone();
            timer.schedule(Duration::from_millis(ms), Box::new(move || tx.send(label).unwrap()));
        }
        let fired: Vec<&str> = rx.iter().take(3).collect();
        assert_eq!(fired, ["a", "b", "c"]);
    }

    #[test]
    fn test_same_deadline_keeps_submission_order() {
        let timer = Timer::new("test.timer.fifo");
        let (tx, rx) = channel();
        for i in 0..10 {
            let tx = tx.clone();
            timer.schedule(Duration::ZERO, Box::new(move || tx.send(i).unwrap()));
        }
        let fired: Vec<i32> = rx.iter().take(10).collect();
        assert_eq!(fired, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_dropped_timer_runs_pending_jobs() {
        let timer = Timer::new("test.timer.drop");
        let (tx, rx) = channel();
        let start = Instant::now();
        timer.schedule(Duration::from_millis(30), Box::new(move || tx.send(()).unwrap()));
        drop(timer);
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_does_not_fire_early() {
        let timer = Timer::new("test.timer.early");
        let (tx, rx) = channel();
        let start = Instant::now();
        timer.schedule(Duration::from_millis(40), Box::new(move || tx.send(()).unwrap()));
        rx.recv().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(timer.pending(), 0);
    }
}
