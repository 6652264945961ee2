//! Error types for tally.

use alloc::boxed::Box;
use alloc::string::String;
use thiserror::Error;

/// Result type alias for tally operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for totals and subscription operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// An observer rejected a delivered value.
    #[error("Subscriber fault: {message}")]
    SubscriberFault { message: String },
    /// Some observers of a fan-out failed. Delivery still reached the others.
    #[error("Delivery to {target} failed for {failed} of {attempted} subscribers: {first}")]
    DeliveryFailed {
        target: String,
        failed: usize,
        attempted: usize,
        first: Box<Error>,
    },
    /// An observer was handed a value while it was still handling another.
    #[error("Re-entrant delivery to a subscriber that is still running")]
    ReentrantDelivery,
    /// A totals entity was given to the wrong slot.
    #[error("Key mismatch: expected {expected}, got {got}")]
    KeyMismatch { expected: String, got: String },
}

impl Error {
    /// Creates a subscriber fault.
    pub fn subscriber_fault(message: impl Into<String>) -> Self {
        Error::SubscriberFault {
            message: message.into(),
        }
    }

    /// Creates a delivery summary error keeping the first failure.
    pub fn delivery_failed(
        target: impl Into<String>,
        failed: usize,
        attempted: usize,
        first: Error,
    ) -> Self {
        Error::DeliveryFailed {
            target: target.into(),
            failed,
            attempted,
            first: Box::new(first),
        }
    }

    /// Creates a key mismatch error.
    pub fn key_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::KeyMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Returns the error that caused a delivery summary, or `self`.
    pub fn root(&self) -> &Error {
        match self {
            Error::DeliveryFailed { first, .. } => first.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = Error::subscriber_fault("view closed");
        assert!(err.to_string().contains("view closed"));

        let err = Error::key_mismatch("all", "filtered");
        assert!(err.to_string().contains("expected all"));

        let err = Error::delivery_failed("filtered", 1, 3, Error::ReentrantDelivery);
        let text = err.to_string();
        assert!(text.contains("filtered"));
        assert!(text.contains("1 of 3"));
    }

    #[test]
    fn test_error_root() {
        let inner = Error::subscriber_fault("boom");
        let outer = Error::delivery_failed(
            "all",
            1,
            1,
            Error::delivery_failed("row 1", 1, 2, inner.clone()),
        );
        assert_eq!(outer.root(), &inner);
        assert_eq!(inner.root(), &inner);
    }
}
