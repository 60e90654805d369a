use crate::{event::Event, lock, scheduler::Scheduler};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

type Continuation<T, E> = Box<dyn FnMut(Event<T, E>) + Send>;

/// The continuation a promise operation reports through.
///
/// Clones share one subscription. Every event is dispatched onto the
/// completion scheduler; the first terminal event wins and anything sent after
/// it is dropped. If every clone is dropped before a terminal event, the
/// subscription is abandoned and the consumer's continuation is dropped
/// without being called.
pub struct Resolver<T, E> {
    sink: Arc<Sink<T, E>>,
}

struct Sink<T, E> {
    finished: AtomicBool,
    include_progress: bool,
    scheduler: Arc<dyn Scheduler>,
    continuation: Mutex<Option<Continuation<T, E>>>,
}

impl<T, E> Resolver<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(
        scheduler: Arc<dyn Scheduler>,
        include_progress: bool,
        continuation: Continuation<T, E>,
    ) -> Self {
        Self {
            sink: Arc::new(Sink {
                finished: AtomicBool::new(false),
                include_progress,
                scheduler,
                continuation: Mutex::new(Some(continuation)),
            }),
        }
    }

    pub fn send(&self, event: Event<T, E>) {
        let sink = self.sink.clone();
        self.sink
            .scheduler
            .execute(Box::new(move || sink.deliver(event)));
    }

    pub fn resolve(&self, value: T) {
        self.send(Event::Success(value))
    }

    pub fn reject(&self, err: E) {
        self.send(Event::Failure(err))
    }

    pub fn progress(&self, ratio: f64) {
        self.send(Event::Progress(ratio))
    }

    pub fn settle(&self, result: Result<T, E>) {
        self.send(result.into())
    }

    /// True once a terminal event has been delivered.
    pub fn is_finished(&self) -> bool {
        self.sink.finished.load(Ordering::Acquire)
    }
}

impl<T, E> Sink<T, E> {
    fn deliver(&self, event: Event<T, E>) {
        if self.finished.load(Ordering::Acquire) {
            tracing::trace!(terminal = event.is_terminal(), "dropping event after settlement");
            return;
        }
        match event {
            Event::Progress(ratio) => {
                if self.include_progress {
                    if let Some(continuation) = lock(&self.continuation).as_mut() {
                        continuation(Event::Progress(ratio));
                    }
                }
            }
            terminal => {
                if self.finished.swap(true, Ordering::AcqRel) {
                    return;
                }
                // Taken out so the continuation can resolve other promises
                // without holding this lock.
                let continuation = lock(&self.continuation).take();
                if let Some(mut continuation) = continuation {
                    continuation(terminal);
                }
            }
        }
    }
}

impl<T, E> Drop for Sink<T, E> {
    fn drop(&mut self) {
        if !*self.finished.get_mut() {
            tracing::debug!("promise abandoned before it settled");
        }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("finished", &self.sink.finished.load(Ordering::Acquire))
            .field("include_progress", &self.sink.include_progress)
            .finish()
    }
}
