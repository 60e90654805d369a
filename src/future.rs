//! Awaiting a promise from async code.
//!
//! The future subscribes on its first poll. The producer side stores the
//! outcome and wakes the last waker; if the subscription is abandoned the
//! producer is dropped unresolved, taints the waker slot and the future
//! finishes with [`Error::Abandoned`].
use crate::{error::Error, lock, promise::Promise};
use std::{
    future::{Future, IntoFuture},
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, Waker},
};

/// Future returned by `promise.into_future()`.
pub struct Settled<T, E> {
    promise: Option<Promise<T, E>>,
    shared: Arc<Mutex<Inner<T, E>>>,
}

struct Producer<T, E> {
    shared: Arc<Mutex<Inner<T, E>>>,
}

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

struct Inner<T, E> {
    value: Option<Result<T, E>>,
    waker: Result<Waker, WakerState>,
}

impl<T, E> Producer<T, E> {
    fn resolve(self, result: Result<T, E>) {
        let mut inner = lock(&self.shared);
        inner.value = Some(result);
        if let Ok(waker) = std::mem::replace(&mut inner.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T, E> Drop for Producer<T, E> {
    /// An unresolved producer wakes the consumer so it can report abandonment.
    fn drop(&mut self) {
        let mut inner = lock(&self.shared);
        if let Ok(waker) = std::mem::replace(&mut inner.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T, E> Future for Settled<T, E>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(promise) = this.promise.take() {
            let producer = Producer {
                shared: this.shared.clone(),
            };
            promise.done(move |result| producer.resolve(result));
        }
        let mut inner = lock(&this.shared);
        match inner.value.take() {
            Some(value) => Poll::Ready(value),
            None => match std::mem::replace(&mut inner.waker, Ok(cx.waker().clone())) {
                Err(WakerState::Tainted) => Poll::Ready(Err(Error::Abandoned.into())),
                _ => Poll::Pending,
            },
        }
    }
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = Settled<T, E>;

    /// ```
    /// use futures::executor::block_on;
    /// use promise_kit::{Error, Promise};
    ///
    /// let promise = Promise::<i32, Error>::resolved(1).then(|v| Ok(v + 1));
    /// assert_eq!(block_on(async { promise.await }), Ok(2));
    /// ```
    fn into_future(self) -> Settled<T, E> {
        Settled {
            promise: Some(self),
            shared: Arc::new(Mutex::new(Inner {
                value: None,
                waker: Err(WakerState::Fresh),
            })),
        }
    }
}
