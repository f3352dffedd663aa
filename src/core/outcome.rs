//! Two-variant result value for expected failure paths

use crate::core::error::{Error, Result};

/// Either a valid value or an error description
///
/// Used where a failure is an ordinary, expected answer (a lookup that may miss, a wait that
/// may time out) rather than something that should end a module's phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome<T, E> {
    Ok(T),
    Err(E),
}

impl<T, E> Outcome<T, E> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Outcome::Err(_))
    }

    /// The valid value, if any
    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(value) => Some(value),
            Outcome::Err(_) => None,
        }
    }

    /// The error description, if any
    pub fn err(self) -> Option<E> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Err(error) => Some(error),
        }
    }

    /// The valid value, or a hard error carrying `message`
    pub fn expect(self, message: &str) -> Result<T> {
        match self {
            Outcome::Ok(value) => Ok(value),
            Outcome::Err(_) => Err(Error::hard(message)),
        }
    }

    /// The error description, or a hard error carrying `message`
    pub fn expect_err(self, message: &str) -> Result<E> {
        match self {
            Outcome::Ok(_) => Err(Error::hard(message)),
            Outcome::Err(error) => Ok(error),
        }
    }

    pub fn unwrap(self) -> Result<T> {
        self.expect("Expected valid result value, found error")
    }

    pub fn unwrap_err(self) -> Result<E> {
        self.expect_err("Expected invalid result value, found valid one")
    }

    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Outcome::Ok(value) => value,
            Outcome::Err(_) => default,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U, E> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(f(value)),
            Outcome::Err(error) => Outcome::Err(error),
        }
    }

    pub fn map_err<F2, F: FnOnce(E) -> F2>(self, f: F) -> Outcome<T, F2> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(value),
            Outcome::Err(error) => Outcome::Err(f(error)),
        }
    }

    /// Chain another fallible step onto a valid value
    pub fn and_then<U, F: FnOnce(T) -> Outcome<U, E>>(self, f: F) -> Outcome<U, E> {
        match self {
            Outcome::Ok(value) => f(value),
            Outcome::Err(error) => Outcome::Err(error),
        }
    }

    pub fn as_ref(&self) -> Outcome<&T, &E> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(value),
            Outcome::Err(error) => Outcome::Err(error),
        }
    }
}

impl<T, E> From<std::result::Result<T, E>> for Outcome<T, E> {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(error) => Outcome::Err(error),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for std::result::Result<T, E> {
    fn from(outcome: Outcome<T, E>) -> Self {
        match outcome {
            Outcome::Ok(value) => Ok(value),
            Outcome::Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_variant_queries() {
        let ok: Outcome<i32, String> = Outcome::Ok(1);
        let err: Outcome<i32, String> = Outcome::Err("boom".to_string());

        assert!(ok.is_ok() && !ok.is_err());
        assert!(err.is_err() && !err.is_ok());
    }

    #[test]
    fn test_unwrap_or() {
        for v in [-3, 0, 42] {
            assert_eq!(Outcome::<i32, &str>::Ok(v).unwrap_or(7), v);
            assert_eq!(Outcome::<i32, i32>::Err(v).unwrap_or(7), 7);
        }
    }

    #[test]
    fn test_unwrap_wrong_variant_is_hard_error() {
        let err: Outcome<i32, &str> = Outcome::Err("nope");
        let error = err.expect("wanted a number").unwrap_err();
        assert_eq!(error.to_string(), "wanted a number");
        assert!(!error.is_soft());

        let ok: Outcome<i32, &str> = Outcome::Ok(3);
        assert_eq!(ok.unwrap().unwrap(), 3);
        assert!(ok.unwrap_err().is_err());
    }

    #[test]
    fn test_value_equality_and_hashing() {
        assert_eq!(Outcome::<i32, i32>::Ok(1), Outcome::Ok(1));
        assert_ne!(Outcome::<i32, i32>::Ok(1), Outcome::Ok(2));
        assert_ne!(Outcome::<i32, i32>::Ok(1), Outcome::Err(1));

        let set: HashSet<Outcome<i32, i32>> =
            [Outcome::Ok(1), Outcome::Ok(1), Outcome::Err(1)].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_combinators() {
        let ok: Outcome<i32, String> = Outcome::Ok(2);
        assert_eq!(ok.clone().map(|v| v * 10), Outcome::Ok(20));
        assert_eq!(
            ok.and_then(|v| if v > 5 { Outcome::Ok(v) } else { Outcome::Err(format!("{v} too small")) }),
            Outcome::Err("2 too small".to_string())
        );

        let result: std::result::Result<i32, String> = Outcome::Ok(5).into();
        assert_eq!(result, Ok(5));
    }
}
