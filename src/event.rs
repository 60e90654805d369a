/// One delivery from a promise operation to its consumer.
///
/// `Progress` may arrive any number of times before exactly one terminal
/// `Success` or `Failure`.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<T, E> {
    Success(T),
    Failure(E),
    Progress(f64),
}

impl<T, E> Event<T, E> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::Progress(_))
    }

    /// The outcome carried by a terminal event, `None` for progress.
    pub fn into_result(self) -> Option<Result<T, E>> {
        match self {
            Event::Success(value) => Some(Ok(value)),
            Event::Failure(err) => Some(Err(err)),
            Event::Progress(_) => None,
        }
    }
}

impl<T, E> From<Result<T, E>> for Event<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Event::Success(value),
            Err(err) => Event::Failure(err),
        }
    }
}
