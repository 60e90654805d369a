use crate::{
    scheduler::{Detached, Scheduler, SerialQueue},
    timer::Timer,
};
use std::{
    fmt,
    sync::{Arc, LazyLock},
};

static DEFAULT: LazyLock<Config> = LazyLock::new(|| Config {
    scheduler: Arc::new(SerialQueue::new("promise-kit.completion")),
    background: Arc::new(Detached),
    timer: Arc::new(Timer::new("promise-kit.timer")),
});

/// The runtime a promise executes against.
///
/// Every promise carries the `Config` it was built with, and combinators hand
/// it on to the promises they create, so one configuration flows through a
/// whole chain. Cloning is cheap.
///
/// ```
/// use promise_kit::{scheduler::Inline, Config};
/// use std::sync::Arc;
///
/// let config = Config::builder().scheduler(Arc::new(Inline)).build();
/// let outcome: Result<i32, promise_kit::Error> = config.resolved(1).then(|v| Ok(v + 1)).wait();
/// assert_eq!(outcome, Ok(2));
/// ```
#[derive(Clone)]
pub struct Config {
    scheduler: Arc<dyn Scheduler>,
    background: Arc<dyn Scheduler>,
    timer: Arc<Timer>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Where every success, failure and progress event is delivered.
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Where `spawn` runs its blocks.
    pub fn background(&self) -> &Arc<dyn Scheduler> {
        &self.background
    }

    pub fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }
}

impl Default for Config {
    /// A clone of the process-wide default: a serial completion queue, a
    /// thread per background job and a shared timer.
    fn default() -> Self {
        DEFAULT.clone()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("scheduler", &self.scheduler)
            .field("background", &self.background)
            .field("timer", &self.timer)
            .finish()
    }
}

#[derive(Default)]
pub struct ConfigBuilder {
    scheduler: Option<Arc<dyn Scheduler>>,
    background: Option<Arc<dyn Scheduler>>,
    timer: Option<Arc<Timer>>,
}

impl ConfigBuilder {
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn background(mut self, background: Arc<dyn Scheduler>) -> Self {
        self.background = Some(background);
        self
    }

    pub fn timer(mut self, timer: Arc<Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Parts left unset fall back to the process-wide defaults.
    pub fn build(self) -> Config {
        Config {
            scheduler: self.scheduler.unwrap_or_else(|| DEFAULT.scheduler.clone()),
            background: self.background.unwrap_or_else(|| DEFAULT.background.clone()),
            timer: self.timer.unwrap_or_else(|| DEFAULT.timer.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::scheduler::Inline;
    use std::sync::Arc;

    #[test]
    fn test_default_shares_parts() {
        let a = Config::default();
        let b = Config::default();
        assert!(Arc::ptr_eq(a.scheduler(), b.scheduler()));
        assert!(Arc::ptr_eq(a.timer(), b.timer()));
    }

    #[test]
    fn test_builder_overrides_only_what_is_set() {
        let inline: Arc<dyn crate::Scheduler> = Arc::new(Inline);
        let config = Config::builder().scheduler(inline.clone()).build();
        assert!(Arc::ptr_eq(config.scheduler(), &inline));
        assert!(Arc::ptr_eq(config.timer(), Config::default().timer()));
        assert!(format!("{config:?}").contains("Inline"));
    }
}
