//! Single-resolution promises with chaining, progress reporting, delay,
//! timeout, retry and `all`/`any`/`race` combinators.
//!
//! A [`Promise`] wraps an operation that reports through a [`Resolver`]: any
//! number of progress updates, then exactly one success or failure. Nothing
//! runs until the promise is consumed. Every event is delivered on the
//! completion scheduler of the promise's [`Config`], a serial queue unless
//! configured otherwise.
//!
//! ```
//! use promise_kit::{spawn, wait, Error};
//! use std::time::Duration;
//!
//! let doubled = spawn(|| Ok::<_, Error>(21))
//!     .then(|v| Ok(v * 2))
//!     .timeout(Duration::from_secs(5), None);
//! assert_eq!(wait(doubled), Ok(42));
//! ```
//!
//! Failures are values: they flow down `then` chains untouched until a
//! `recover`, `subscribe` or `done` handles them. Only [`wait`] turns them
//! back into a synchronous `Err` for the calling thread.
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

mod blocking;
pub mod combinators;
mod config;
mod error;
mod event;
mod future;
mod promise;
mod resolver;
pub mod scheduler;
pub mod timer;

pub use config::{Config, ConfigBuilder};
pub use error::Error;
pub use event::Event;
pub use future::Settled;
pub use promise::{Callback, IntoPromise, Promise, Verdict};
pub use resolver::Resolver;
pub use scheduler::Scheduler;

/// Runs `block` on a background thread; the promise settles with its result.
pub fn spawn<T, E, F>(block: F) -> Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    Config::default().spawn(block)
}

/// Blocks until `promise` settles. See [`Promise::wait`].
pub fn wait<T, E>(promise: Promise<T, E>) -> Result<T, E>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
{
    promise.wait()
}

pub fn delay<E>(time: Duration) -> Promise<Duration, E>
where
    E: Send + 'static,
{
    Config::default().delay(time)
}

/// `block` runs at most `times + 1` times. See [`Config::retry`].
pub fn retry<T, E, F>(times: usize, delay: Duration, block: F) -> Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnMut() -> Promise<T, E> + Send + 'static,
{
    Config::default().retry(times, delay, block)
}

pub fn all<T, E>(promises: Vec<Promise<T, E>>) -> Promise<Vec<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    Promise::all(promises)
}

pub fn any<T, E>(promises: Vec<Promise<T, E>>) -> Promise<T, E>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
{
    Promise::any(promises)
}

pub fn race<T, E>(promises: Vec<Promise<T, E>>) -> Promise<T, E>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
{
    Promise::race(promises)
}

/// Locks `mutex`, recovering the data if a panicking callback poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
