//! Error types for the card-stunt engine.
//!
//! Errors fall into four families, and only the first one ever reaches the
//! caller of a public operation:
//!
//! - **Input errors**: malformed seat text, out-of-range frequency or duty
//!   cycle, unparsable colors or start times. Rejected synchronously.
//! - **Transient remote failures**: the shared store or remote config is
//!   unreachable, a write failed or timed out. Logged and swallowed by the
//!   owning component.
//! - **Hardware errors**: the flash unit refused access. Translated to
//!   "unavailable" by the actuator.
//! - **Persistence errors**: the local safety store could not be read or
//!   written. Logged; safety limits still apply from memory.
//!
//! Safety limit violations are not errors at all: they force-stop the
//! session and surface as a block reason on the safety state.
//!
//! ```rust
//! use cardstunt::StuntError;
//!
//! let error = StuntError::store_failed("publish flashSync");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for card-stunt operations.
pub type Result<T, E = StuntError> = std::result::Result<T, E>;

/// Main error type for card-stunt operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StuntError {
    #[error("Invalid seat '{input}': {reason}")]
    InvalidSeat { input: String, reason: String },

    #[error("Invalid frequency {value}Hz: must be between 1 and 10 Hz")]
    InvalidFrequency { value: u32 },

    #[error("Invalid duty cycle {value}: must be between 0.1 and 0.9")]
    InvalidDutyCycle { value: f64 },

    #[error("Invalid color '{value}': expected #RRGGBB or #AARRGGBB")]
    InvalidColor { value: String },

    #[error("Invalid start time '{value}': expected HH:MM:SS")]
    InvalidStartTime { value: String },

    #[error("Shared store operation failed: {operation}")]
    Store {
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Safety persistence failed: {context}")]
    Persistence {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Flash hardware error during {operation}: {reason}")]
    Hardware { operation: String, reason: String },

    #[error("Configuration error for '{key}': {details}")]
    Config { key: String, details: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },
}

impl StuntError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StuntError::Store { .. } => true,
            StuntError::Timeout { .. } => true,
            StuntError::Persistence { .. } => true,
            StuntError::Hardware { .. } => false,
            StuntError::InvalidSeat { .. } => false,
            StuntError::InvalidFrequency { .. } => false,
            StuntError::InvalidDutyCycle { .. } => false,
            StuntError::InvalidColor { .. } => false,
            StuntError::InvalidStartTime { .. } => false,
            StuntError::Config { .. } => false,
            StuntError::Parse { .. } => false,
        }
    }

    /// Returns whether this error is a caller input rejection.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            StuntError::InvalidSeat { .. }
                | StuntError::InvalidFrequency { .. }
                | StuntError::InvalidDutyCycle { .. }
                | StuntError::InvalidColor { .. }
                | StuntError::InvalidStartTime { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StuntError::InvalidSeat { .. } => vec![
                "Use a format like 'Section A, Row 5, Seat 12'",
                "Use the compact form 'A-5-12'",
                "Row and seat numbers must be positive",
            ],
            StuntError::InvalidFrequency { .. } => {
                vec!["Choose a frequency between 1 and 10 Hz", "Lower the frequency in photosensitive mode"]
            }
            StuntError::InvalidDutyCycle { .. } => vec!["Choose a duty cycle between 0.1 and 0.9"],
            StuntError::InvalidColor { .. } => {
                vec!["Use a hex color such as #0000FF", "Include the leading '#'"]
            }
            StuntError::InvalidStartTime { .. } => {
                vec!["Use 24-hour HH:MM:SS", "Hours 0-23, minutes and seconds 0-59"]
            }
            StuntError::Store { .. } => vec![
                "Check network connectivity",
                "Verify the shared store is reachable",
                "Retry once the connection is restored",
            ],
            StuntError::Persistence { .. } => vec![
                "Check the safety state file is writable",
                "Ensure sufficient disk space",
            ],
            StuntError::Hardware { .. } => vec![
                "Check the camera permission is granted",
                "Close other applications using the flash",
                "Restart the device",
            ],
            StuntError::Config { .. } => {
                vec!["Check configuration key spelling", "Verify value types and ranges"]
            }
            StuntError::Parse { .. } => {
                vec!["Verify source data integrity", "Check record format compatibility"]
            }
            StuntError::Timeout { .. } => vec![
                "Increase the remote timeout",
                "Check network latency",
                "Verify the shared store is responding",
            ],
        }
    }

    /// Helper constructor for seat parse failures.
    pub fn invalid_seat(input: impl Into<String>, reason: impl Into<String>) -> Self {
        StuntError::InvalidSeat { input: input.into(), reason: reason.into() }
    }

    /// Helper constructor for shared store failures.
    pub fn store_failed(operation: impl Into<String>) -> Self {
        StuntError::Store { operation: operation.into(), source: None }
    }

    /// Helper constructor for persistence failures with source.
    pub fn persistence_failed(
        context: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StuntError::Persistence { context: context.into(), source: Some(source) }
    }

    /// Helper constructor for hardware failures.
    pub fn hardware(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        StuntError::Hardware { operation: operation.into(), reason: reason.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        StuntError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(key: impl Into<String>, details: impl Into<String>) -> Self {
        StuntError::Config { key: key.into(), details: details.into() }
    }
}

impl From<serde_yaml_ng::Error> for StuntError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        StuntError::Parse { context: "YAML".to_string(), details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_messages_carry_their_context(
            input in ".*",
            reason in ".*",
            operation in ".*",
            value in 0u32..1000u32,
        ) {
            let seat = StuntError::invalid_seat(input.clone(), reason.clone());
            let msg = seat.to_string();
            prop_assert!(msg.contains(&input));
            prop_assert!(msg.contains(&reason));

            let store = StuntError::store_failed(operation.clone());
            prop_assert!(store.to_string().contains(&operation));

            let freq = StuntError::InvalidFrequency { value };
            prop_assert!(freq.to_string().contains(&value.to_string()));
        }

        #[test]
        fn source_chain_is_preserved(base in "[a-z]{1,20}") {
            let inner: Box<dyn std::error::Error + Send + Sync> =
                Box::new(std::io::Error::other(base.clone()));
            let error = StuntError::persistence_failed("save", inner);
            let source = std::error::Error::source(&error).map(|s| s.to_string());
            prop_assert_eq!(source, Some(base));
        }
    }

    #[test]
    fn input_errors_are_not_retryable() {
        let errors = [
            StuntError::invalid_seat("x", "bad"),
            StuntError::InvalidFrequency { value: 11 },
            StuntError::InvalidDutyCycle { value: 0.95 },
            StuntError::InvalidColor { value: "blue".into() },
            StuntError::InvalidStartTime { value: "25:00".into() },
        ];
        for error in &errors {
            assert!(error.is_input_error(), "{error} should be an input error");
            assert!(!error.is_retryable());
            assert!(!error.recovery_suggestions().is_empty());
        }
    }

    #[test]
    fn transient_failures_are_retryable() {
        let timeout =
            StuntError::Timeout { operation: "publish".into(), duration: Duration::from_secs(5) };
        assert!(timeout.is_retryable());
        assert!(!timeout.is_input_error());
        assert!(StuntError::store_failed("read").is_retryable());
        assert!(!StuntError::hardware("set torch", "busy").is_retryable());
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<StuntError>();

        let error = StuntError::store_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn yaml_errors_convert_to_parse() {
        let err = serde_yaml_ng::from_str::<u32>("not: [a number").unwrap_err();
        let converted: StuntError = err.into();
        assert!(matches!(converted, StuntError::Parse { .. }));
    }
}
