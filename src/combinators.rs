//! Promises built from many promises.
//!
//! Every input is subscribed as soon as the combined promise is consumed.
//! Inputs that lose keep running; whatever they deliver afterwards is dropped
//! by the combined promise's resolver.
use crate::{config::Config, error::Error, event::Event, lock, promise::Promise, resolver::Resolver};
use std::sync::{Arc, Mutex};

struct AllState<T> {
    values: Vec<Option<T>>,
    remaining: usize,
    progress: Vec<f64>,
}

struct FirstState {
    failures: usize,
    progress: Vec<f64>,
}

fn max_progress(progress: &[f64]) -> f64 {
    progress.iter().copied().fold(0.0, f64::max)
}

/// Succeeds with every value, in input order, once all inputs succeed. The
/// first failure settles it. Progress is the mean of the latest progress of
/// each input.
pub fn all<T, E>(config: &Config, promises: Vec<Promise<T, E>>) -> Promise<Vec<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    config.promise(move |resolver: Resolver<Vec<T>, E>| {
        let count = promises.len();
        if count == 0 {
            resolver.resolve(Vec::new());
            return;
        }
        let state = Arc::new(Mutex::new(AllState {
            values: (0..count).map(|_| None).collect(),
            remaining: count,
            progress: vec![0.0; count],
        }));
        for (index, promise) in promises.into_iter().enumerate() {
            let state = state.clone();
            let resolver = resolver.clone();
            promise.execute(true, move |event| match event {
                Event::Success(value) => {
                    let mut state = lock(&state);
                    state.values[index] = Some(value);
                    state.remaining -= 1;
                    if state.remaining == 0 {
                        let values: Vec<T> = state.values.drain(..).flatten().collect();
                        drop(state);
                        resolver.resolve(values);
                    }
                }
                Event::Failure(err) => resolver.reject(err),
                Event::Progress(ratio) => {
                    let mut state = lock(&state);
                    state.progress[index] = ratio;
                    let mean = state.progress.iter().sum::<f64>() / count as f64;
                    drop(state);
                    resolver.progress(mean);
                }
            });
        }
    })
}

/// Succeeds with the first success. Fails with the last failure only once
/// every input has failed. Progress is the highest latest progress.
pub fn any<T, E>(config: &Config, promises: Vec<Promise<T, E>>) -> Promise<T, E>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
{
    config.promise(move |resolver: Resolver<T, E>| {
        let count = promises.len();
        if count == 0 {
            resolver.reject(Error::Default.into());
            return;
        }
        let state = Arc::new(Mutex::new(FirstState {
            failures: 0,
            progress: vec![0.0; count],
        }));
        for (index, promise) in promises.into_iter().enumerate() {
            let state = state.clone();
            let resolver = resolver.clone();
            promise.execute(true, move |event| match event {
                Event::Success(value) => resolver.resolve(value),
                Event::Failure(err) => {
                    let mut state = lock(&state);
                    state.failures += 1;
                    let exhausted = state.failures == count;
                    drop(state);
                    if exhausted {
                        resolver.reject(err);
                    }
                }
                Event::Progress(ratio) => {
                    let mut state = lock(&state);
                    state.progress[index] = ratio;
                    let max = max_progress(&state.progress);
                    drop(state);
                    resolver.progress(max);
                }
            });
        }
    })
}

/// Settles with whichever input settles first, success or failure. Progress
/// is the highest latest progress.
pub fn race<T, E>(config: &Config, promises: Vec<Promise<T, E>>) -> Promise<T, E>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
{
    config.promise(move |resolver: Resolver<T, E>| {
        let count = promises.len();
        if count == 0 {
            resolver.reject(Error::Default.into());
            return;
        }
        let progress = Arc::new(Mutex::new(vec![0.0; count]));
        for (index, promise) in promises.into_iter().enumerate() {
            let progress = progress.clone();
            let resolver = resolver.clone();
            promise.execute(true, move |event| match event {
                Event::Progress(ratio) => {
                    let mut progress = lock(&progress);
                    progress[index] = ratio;
                    let max = max_progress(&progress);
                    drop(progress);
                    resolver.progress(max);
                }
                terminal => resolver.send(terminal),
            });
        }
    })
}

impl Config {
    pub fn all<T, E>(&self, promises: Vec<Promise<T, E>>) -> Promise<Vec<T>, E>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        all(self, promises)
    }

    pub fn any<T, E>(&self, promises: Vec<Promise<T, E>>) -> Promise<T, E>
    where
        T: Send + 'static,
        E: From<Error> + Send + 'static,
    {
        any(self, promises)
    }

    pub fn race<T, E>(&self, promises: Vec<Promise<T, E>>) -> Promise<T, E>
    where
        T: Send + 'static,
        E: From<Error> + Send + 'static,
    {
        race(self, promises)
    }
}

#[cfg(test)]
mod tests {
    use crate::{scheduler::Inline, Config, Error, Event, Promise, Resolver};
    use std::sync::{Arc, Mutex};

    fn inline() -> Config {
        Config::builder().scheduler(Arc::new(Inline)).build()
    }

    /// A promise whose resolver is handed back to the test, so the test
    /// decides when and how it settles.
    fn manual(config: &Config) -> (Promise<i32, Error>, Arc<Mutex<Option<Resolver<i32, Error>>>>) {
        let slot = Arc::new(Mutex::new(None));
        let handle = slot.clone();
        let promise = config.promise(move |resolver| *handle.lock().unwrap() = Some(resolver));
        (promise, slot)
    }

    fn with<R>(slot: &Arc<Mutex<Option<Resolver<i32, Error>>>>, f: impl FnOnce(&Resolver<i32, Error>) -> R) -> R {
        f(slot.lock().unwrap().as_ref().unwrap())
    }

    fn record<T: Send + 'static>(promise: Promise<T, Error>) -> Arc<Mutex<Vec<Event<T, Error>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        promise.execute(true, move |event| sink.lock().unwrap().push(event));
        seen
    }

    #[test]
    fn test_all_keeps_input_order() {
        let config = inline();
        let (first, a) = manual(&config);
        let (second, b) = manual(&config);
        let seen = record(config.all(vec![first, second]));
        with(&b, |r| r.resolve(2));
        assert!(seen.lock().unwrap().is_empty());
        with(&a, |r| r.resolve(1));
        assert_eq!(*seen.lock().unwrap(), vec![Event::Success(vec![1, 2])]);
    }

    #[test]
    fn test_all_progress_is_mean() {
        let config = inline();
        let (first, a) = manual(&config);
        let (second, b) = manual(&config);
        let seen = record(config.all(vec![first, second]));
        with(&a, |r| r.progress(0.5));
        with(&b, |r| r.progress(1.0));
        with(&a, |r| r.reject(Error::Default));
        with(&b, |r| r.resolve(3));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Event::Progress(0.25), Event::Progress(0.75), Event::Failure(Error::Default)]
        );
    }

    #[test]
    fn test_all_empty() {
        let seen = record(inline().all(Vec::<Promise<i32, Error>>::new()));
        assert_eq!(*seen.lock().unwrap(), vec![Event::Success(vec![])]);
    }

    #[test]
    fn test_any_waits_for_every_failure() {
        let config = inline();
        let (first, a) = manual(&config);
        let (second, b) = manual(&config);
        let seen = record(config.any(vec![first, second]));
        with(&a, |r| r.progress(0.4));
        with(&b, |r| r.progress(0.2));
        with(&a, |r| r.reject(Error::Default));
        with(&b, |r| r.reject(Error::Timeout));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Event::Progress(0.4), Event::Progress(0.4), Event::Failure(Error::Timeout)]
        );
    }

    #[test]
    fn test_any_first_success_wins() {
        let config = inline();
        let (first, a) = manual(&config);
        let (second, b) = manual(&config);
        let seen = record(config.any(vec![first, second]));
        with(&a, |r| r.reject(Error::Default));
        with(&b, |r| r.resolve(7));
        assert_eq!(*seen.lock().unwrap(), vec![Event::Success(7)]);
    }

    #[test]
    fn test_race_first_terminal_wins() {
        let config = inline();
        let (first, a) = manual(&config);
        let (second, b) = manual(&config);
        let seen = record(config.race(vec![first, second]));
        with(&b, |r| r.progress(0.3));
        with(&b, |r| r.reject(Error::Timeout));
        with(&a, |r| r.resolve(1));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Event::Progress(0.3), Event::Failure(Error::Timeout)]
        );
    }

    #[test]
    fn test_any_and_race_empty_fail() {
        let config = inline();
        let any = record(config.any(Vec::<Promise<i32, Error>>::new()));
        assert_eq!(*any.lock().unwrap(), vec![Event::Failure(Error::Default)]);
        let race = record(config.race(Vec::<Promise<i32, Error>>::new()));
        assert_eq!(*race.lock().unwrap(), vec![Event::Failure(Error::Default)]);
    }
}
