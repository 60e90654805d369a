//! The promise type, its constructors and its transformation combinators.
//!
//! A promise wraps an operation that has not started yet. Consuming the
//! promise (with [`Promise::execute`], [`Promise::done`], a combinator's
//! subscription, [`Promise::wait`] or `.await`) runs the operation exactly
//! once. Combinators never touch their source after construction; they build
//! a new promise whose operation subscribes to the source.
use crate::{
    combinators, config::Config, error::Error, event::Event, resolver::Resolver,
};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

type Operation<T, E> = Box<dyn FnOnce(Resolver<T, E>) + Send>;

/// Callback handed to [`Promise::from_fn`] style constructors.
pub type Callback<A> = Arc<dyn Fn(A) + Send + Sync>;

pub struct Promise<T, E = Error> {
    operation: Operation<T, E>,
    config: Config,
}

/// What a `then`/`recover` transform may return: a `Result` settles the new
/// promise directly, a `Promise` is subscribed to and its outcome forwarded.
pub trait IntoPromise<T, E>: Send + 'static {
    fn into_promise(self, config: &Config) -> Promise<T, E>;
}

impl<T, E> IntoPromise<T, E> for Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn into_promise(self, _config: &Config) -> Promise<T, E> {
        self
    }
}

impl<T, E> IntoPromise<T, E> for Result<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn into_promise(self, config: &Config) -> Promise<T, E> {
        config.settled(self)
    }
}

/// Outcome of a [`Promise::validate`] predicate.
///
/// `false` becomes [`Error::Validation`]; an `Err` is used as is.
pub trait Verdict<E> {
    fn into_outcome(self) -> Result<(), E>;
}

impl<E: From<Error>> Verdict<E> for bool {
    fn into_outcome(self) -> Result<(), E> {
        if self {
            Ok(())
        } else {
            Err(Error::Validation.into())
        }
    }
}

impl<E> Verdict<E> for Result<(), E> {
    fn into_outcome(self) -> Result<(), E> {
        self
    }
}

impl Config {
    /// Builds a promise from a raw operation. The operation runs once, when
    /// the promise is consumed, and reports through the [`Resolver`].
    pub fn promise<T, E, F>(&self, operation: F) -> Promise<T, E>
    where
        F: FnOnce(Resolver<T, E>) + Send + 'static,
    {
        Promise {
            operation: Box::new(operation),
            config: self.clone(),
        }
    }

    pub fn from_fn<T, E, F>(&self, operation: F) -> Promise<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(Callback<T>, Callback<E>) + Send + 'static,
    {
        self.promise(move |resolver: Resolver<T, E>| {
            let reject = resolver.clone();
            operation(
                Arc::new(move |value| resolver.resolve(value)),
                Arc::new(move |err| reject.reject(err)),
            )
        })
    }

    pub fn from_fn_with_progress<T, E, F>(&self, operation: F) -> Promise<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(Callback<T>, Callback<E>, Callback<f64>) + Send + 'static,
    {
        self.promise(move |resolver: Resolver<T, E>| {
            let reject = resolver.clone();
            let progress = resolver.clone();
            operation(
                Arc::new(move |value| resolver.resolve(value)),
                Arc::new(move |err| reject.reject(err)),
                Arc::new(move |ratio| progress.progress(ratio)),
            )
        })
    }

    pub fn resolved<T, E>(&self, value: T) -> Promise<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        self.promise(move |resolver: Resolver<T, E>| resolver.resolve(value))
    }

    pub fn rejected<T, E>(&self, err: E) -> Promise<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        self.promise(move |resolver: Resolver<T, E>| resolver.reject(err))
    }

    pub fn settled<T, E>(&self, result: Result<T, E>) -> Promise<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        self.promise(move |resolver: Resolver<T, E>| resolver.settle(result))
    }

    /// Runs `block` on the background scheduler and settles with its result.
    pub fn spawn<T, E, F>(&self, block: F) -> Promise<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let background = self.background().clone();
        self.promise(move |resolver: Resolver<T, E>| {
            background.execute(Box::new(move || resolver.settle(block())))
        })
    }

    /// Succeeds with the measured elapsed time once `time` has passed.
    pub fn delay<E>(&self, time: Duration) -> Promise<Duration, E>
    where
        E: Send + 'static,
    {
        let timer = self.timer().clone();
        self.promise(move |resolver: Resolver<Duration, E>| {
            let start = Instant::now();
            timer.schedule(time, Box::new(move || resolver.resolve(start.elapsed())));
        })
    }

    /// Subscribes to `block()`, and on failure to a fresh `block()` up to
    /// `times` more times, `delay` apart. `block` runs `times + 1` times at
    /// most.
    pub fn retry<T, E, F>(&self, times: usize, delay: Duration, mut block: F) -> Promise<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnMut() -> Promise<T, E> + Send + 'static,
    {
        self.promise(move |resolver: Resolver<T, E>| {
            block().retry(times, delay, block).forward(resolver)
        })
    }
}

impl<T, E> Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// A promise on the default [`Config`]. See [`Config::promise`].
    pub fn new<F>(operation: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) + Send + 'static,
    {
        Config::default().promise(operation)
    }

    /// ```
    /// use promise_kit::{Error, Promise};
    ///
    /// let promise = Promise::from_fn(|resolve, _reject| {
    ///     std::thread::spawn(move || resolve(String::from("🍓")));
    /// });
    /// assert_eq!(promise.wait(), Ok::<_, Error>("🍓".to_string()));
    /// ```
    pub fn from_fn<F>(operation: F) -> Self
    where
        F: FnOnce(Callback<T>, Callback<E>) + Send + 'static,
    {
        Config::default().from_fn(operation)
    }

    pub fn from_fn_with_progress<F>(operation: F) -> Self
    where
        F: FnOnce(Callback<T>, Callback<E>, Callback<f64>) + Send + 'static,
    {
        Config::default().from_fn_with_progress(operation)
    }

    pub fn resolved(value: T) -> Self {
        Config::default().resolved(value)
    }

    pub fn rejected(err: E) -> Self {
        Config::default().rejected(err)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the operation. Every event it reports is dispatched onto the
    /// completion scheduler and handed to `continuation`: progress only when
    /// `include_progress` is set, then the first terminal event. Anything
    /// after the terminal event is dropped.
    pub fn execute<F>(self, include_progress: bool, continuation: F)
    where
        F: FnMut(Event<T, E>) + Send + 'static,
    {
        let resolver = Resolver::new(
            self.config.scheduler().clone(),
            include_progress,
            Box::new(continuation),
        );
        (self.operation)(resolver)
    }

    pub(crate) fn forward(self, resolver: Resolver<T, E>) {
        self.execute(true, move |event| resolver.send(event))
    }

    pub fn done<F>(self, completion: F)
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let mut completion = Some(completion);
        self.execute(false, move |event| {
            if let Some(result) = event.into_result() {
                if let Some(completion) = completion.take() {
                    completion(result)
                }
            }
        })
    }

    /// `on_done` or `on_catch`, then `on_finally`.
    pub fn subscribe<D, C, Z>(self, on_done: D, on_catch: C, on_finally: Z)
    where
        D: FnOnce(T) + Send + 'static,
        C: FnOnce(E) + Send + 'static,
        Z: FnOnce() + Send + 'static,
    {
        self.done(move |result| {
            match result {
                Ok(value) => on_done(value),
                Err(err) => on_catch(err),
            }
            on_finally()
        })
    }

    /// Like [`Promise::subscribe`], with every progress report passed to
    /// `on_progress` before the outcome.
    pub fn subscribe_with_progress<D, C, P, Z>(
        self,
        on_done: D,
        on_catch: C,
        mut on_progress: P,
        on_finally: Z,
    ) where
        D: FnOnce(T) + Send + 'static,
        C: FnOnce(E) + Send + 'static,
        P: FnMut(f64) + Send + 'static,
        Z: FnOnce() + Send + 'static,
    {
        let mut handlers = Some((on_done, on_catch, on_finally));
        self.execute(true, move |event| {
            let result = match event {
                Event::Progress(ratio) => return on_progress(ratio),
                Event::Success(value) => Ok(value),
                Event::Failure(err) => Err(err),
            };
            if let Some((on_done, on_catch, on_finally)) = handlers.take() {
                match result {
                    Ok(value) => on_done(value),
                    Err(err) => on_catch(err),
                }
                on_finally()
            }
        })
    }

    /// Transforms the success value. Returning a `Promise` flattens it: the
    /// new promise settles with the inner promise's outcome. Failures and
    /// progress pass through untouched.
    pub fn then<U, R, F>(self, transform: F) -> Promise<U, E>
    where
        U: Send + 'static,
        R: IntoPromise<U, E>,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let config = self.config.clone();
        self.config.clone().promise(move |resolver: Resolver<U, E>| {
            let mut transform = Some(transform);
            self.execute(true, move |event| match event {
                Event::Success(value) => {
                    if let Some(transform) = transform.take() {
                        transform(value)
                            .into_promise(&config)
                            .forward(resolver.clone());
                    }
                }
                Event::Failure(err) => resolver.reject(err),
                Event::Progress(ratio) => resolver.progress(ratio),
            })
        })
    }

    /// The mirror of [`Promise::then`]: only failures are transformed.
    pub fn recover<R, F>(self, transform: F) -> Promise<T, E>
    where
        R: IntoPromise<T, E>,
        F: FnOnce(E) -> R + Send + 'static,
    {
        let config = self.config.clone();
        self.config.clone().promise(move |resolver: Resolver<T, E>| {
            let mut transform = Some(transform);
            self.execute(true, move |event| match event {
                Event::Failure(err) => {
                    if let Some(transform) = transform.take() {
                        transform(err)
                            .into_promise(&config)
                            .forward(resolver.clone());
                    }
                }
                Event::Success(value) => resolver.resolve(value),
                Event::Progress(ratio) => resolver.progress(ratio),
            })
        })
    }

    /// Turns a success into a failure when `predicate` rejects it.
    pub fn validate<V, F>(self, predicate: F) -> Promise<T, E>
    where
        V: Verdict<E>,
        F: FnOnce(&T) -> V + Send + 'static,
    {
        self.then(move |value| predicate(&value).into_outcome().map(|()| value))
    }

    /// Folds `items` into the value one asynchronous step at a time. Step
    /// `n + 1` starts after step `n` settles; the first failure ends the fold.
    pub fn reduce<I, R, F>(self, items: I, reducer: F) -> Promise<T, E>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        R: IntoPromise<T, E>,
        F: Fn(T, I::Item) -> R + Send + Sync + 'static,
    {
        let reducer = Arc::new(reducer);
        items.into_iter().fold(self, |promise, item| {
            let reducer = reducer.clone();
            promise.then(move |value| reducer(value, item))
        })
    }

    /// Holds a success back for `time`. Failures are forwarded at once
    /// unless `force` is set.
    pub fn delay(self, time: Duration, force: bool) -> Promise<T, E> {
        let timer = self.config.timer().clone();
        self.config.clone().promise(move |resolver: Resolver<T, E>| {
            self.execute(true, move |event| match event {
                Event::Progress(ratio) => resolver.progress(ratio),
                Event::Failure(_) if !force => resolver.send(event),
                terminal => {
                    let resolver = resolver.clone();
                    timer.schedule(time, Box::new(move || resolver.send(terminal)));
                }
            })
        })
    }

    /// Races this promise against a timer that fails with `error`, or
    /// [`Error::Timeout`] when `None`, after `time`. The loser keeps running;
    /// its outcome is discarded.
    pub fn timeout(self, time: Duration, error: Option<E>) -> Promise<T, E>
    where
        E: From<Error>,
    {
        let timer = self.config.timer().clone();
        let alarm = self.config.promise(move |resolver: Resolver<T, E>| {
            timer.schedule(
                time,
                Box::new(move || {
                    tracing::trace!(?time, "timeout timer fired");
                    resolver.reject(error.unwrap_or_else(|| Error::Timeout.into()))
                }),
            )
        });
        let config = self.config.clone();
        combinators::race(&config, vec![self, alarm])
    }

    /// On failure waits `delay`, then subscribes to a fresh `block()`; at
    /// most `times` extra attempts. Settles with the first success or the
    /// last failure.
    pub fn retry<F>(self, times: usize, delay: Duration, block: F) -> Promise<T, E>
    where
        F: FnMut() -> Promise<T, E> + Send + 'static,
    {
        let config = self.config.clone();
        self.recover(move |err| {
            if times == 0 {
                return config.rejected(err);
            }
            tracing::debug!(remaining = times, ?delay, "retrying failed promise");
            config.delay::<E>(delay).then(move |_| {
                let mut block = block;
                block().retry(times - 1, delay, block)
            })
        })
    }

    /// See [`combinators::all`](crate::combinators).
    pub fn all(promises: Vec<Promise<T, E>>) -> Promise<Vec<T>, E> {
        combinators::all(&config_of(&promises), promises)
    }

    pub fn any(promises: Vec<Promise<T, E>>) -> Promise<T, E>
    where
        E: From<Error>,
    {
        combinators::any(&config_of(&promises), promises)
    }

    pub fn race(promises: Vec<Promise<T, E>>) -> Promise<T, E>
    where
        E: From<Error>,
    {
        combinators::race(&config_of(&promises), promises)
    }
}

fn config_of<T, E>(promises: &[Promise<T, E>]) -> Config {
    promises
        .first()
        .map(|promise| promise.config.clone())
        .unwrap_or_default()
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
