/// Failures the library produces on its own.
///
/// Combinators that need to synthesise a failure (validation, timeout, the
/// blocking bridge) require the promise error type to implement
/// `From<Error>`. Each kind carries a stable [`Error::code`] so handlers can
/// tell them apart after conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    #[error("promise failed")]
    Default,
    #[error("validation failed")]
    Validation,
    #[error("promise timed out")]
    Timeout,
    #[error("promise was abandoned before it settled")]
    Abandoned,
    #[error("wait called on the completion scheduler thread")]
    WouldDeadlock,
}

impl Error {
    pub fn code(&self) -> u32 {
        match self {
            Error::Default => 1,
            Error::Validation => 2,
            Error::Timeout => 3,
            Error::Abandoned => 4,
            Error::WouldDeadlock => 5,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Error::Default),
            2 => Some(Error::Validation),
            3 => Some(Error::Timeout),
            4 => Some(Error::Abandoned),
            5 => Some(Error::WouldDeadlock),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_codes_are_stable() {
        for error in [
            Error::Default,
            Error::Validation,
            Error::Timeout,
            Error::Abandoned,
            Error::WouldDeadlock,
        ] {
            assert_eq!(Error::from_code(error.code()), Some(error));
        }
        assert_eq!(Error::from_code(0), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::Timeout.to_string(), "promise timed out");
        assert_eq!(Error::Validation.to_string(), "validation failed");
    }
}
