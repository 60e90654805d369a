//! The synchronous bridge: block a thread until a promise settles.
use crate::{error::Error, promise::Promise};
use std::sync::mpsc::sync_channel;

impl<T, E> Promise<T, E>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
{
    /// Blocks the calling thread until the promise settles.
    ///
    /// Not reentrant on the completion scheduler: the outcome is delivered on
    /// that scheduler, so waiting on its own thread could never finish. That
    /// case returns [`Error::WouldDeadlock`] right away. A promise whose
    /// operation dropped its resolver without settling yields
    /// [`Error::Abandoned`].
    ///
    /// The guard only knows this promise's own completion scheduler. If the
    /// chain flattens a promise built on a different [`Config`](crate::Config),
    /// for example `custom.resolved(1).then(|v| spawn(move || Ok(v)))`, the
    /// outcome also passes through that other scheduler, and waiting on its
    /// thread still blocks forever. Only wait from threads that belong to no
    /// scheduler in the chain.
    ///
    /// ```
    /// use promise_kit::{spawn, wait, Error};
    ///
    /// let answer: Result<i32, Error> = wait(spawn(|| Ok(42)));
    /// assert_eq!(answer, Ok(42));
    /// ```
    pub fn wait(self) -> Result<T, E> {
        if self.config().scheduler().is_current() {
            tracing::warn!("wait called on the completion scheduler thread");
            return Err(Error::WouldDeadlock.into());
        }
        let (tx, rx) = sync_channel(1);
        self.done(move |result| {
            let _ = tx.send(result);
        });
        rx.recv().unwrap_or_else(|_| Err(Error::Abandoned.into()))
    }
}

#[cfg(test)]
mod tests {
    use crate::{scheduler::Inline, Config, Error, Promise};
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn test_wait_on_other_thread() {
        let promise: Promise<String, Error> = Promise::new(|resolver| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                resolver.resolve("Hello, thread".to_owned());
            });
        });
        assert_eq!(promise.wait(), Ok("Hello, thread".to_owned()));
    }

    #[test]
    fn test_wait_abandoned() {
        let promise: Promise<i32, Error> = Promise::new(|resolver| drop(resolver));
        assert_eq!(promise.wait(), Err(Error::Abandoned));
    }

    #[test]
    fn test_wait_inline_settles_synchronously() {
        let config = Config::builder().scheduler(Arc::new(Inline)).build();
        let outcome: Result<i32, Error> = config.rejected(Error::Timeout).wait();
        assert_eq!(outcome, Err(Error::Timeout));
    }

    #[test]
    fn test_wait_on_scheduler_thread_refuses() {
        let (tx, rx) = std::sync::mpsc::channel();
        Promise::<i32, Error>::resolved(1).done(move |_| {
            let nested: Result<i32, Error> = Promise::resolved(2).wait();
            tx.send(nested).unwrap();
        });
        assert_eq!(rx.recv().unwrap(), Err(Error::WouldDeadlock));
    }
}
