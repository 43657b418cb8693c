//! Error taxonomy for the scheduler.

use thiserror::Error;

use crate::target::TargetError;

/// Errors raised by the scheduling core.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// An event has the wrong arity or argument types for its kind.
    #[error("malformed event {event}: {reason}")]
    MalformedEvent { event: String, reason: String },

    /// An event names a target or sequence the graph does not know.
    #[error("unknown {kind} '{id}'")]
    Reference { kind: &'static str, id: String },

    /// A negative or non-finite time or beat was passed to a conversion.
    #[error("invalid time or beat {0}")]
    InvalidTime(f64),

    /// An operation was called in the wrong transport or sequence state.
    #[error("invalid state: {0}")]
    State(String),

    /// An external target rejected a call.
    #[error("target '{target}' failed at {time:.6}s: {source}")]
    Target {
        target: String,
        time: f64,
        #[source]
        source: TargetError,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub(crate) fn reference(kind: &'static str, id: impl Into<String>) -> Self {
        Self::Reference {
            kind,
            id: id.into(),
        }
    }

    /// Whether this error concerns a single event rather than the caller's request.
    pub fn is_event_scoped(&self) -> bool {
        matches!(
            self,
            Self::MalformedEvent { .. } | Self::Reference { .. } | Self::Target { .. }
        )
    }
}

/// Reject negative or non-finite musical time.
pub(crate) fn check_time(value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SchedulerError::InvalidTime(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_time_accepts_zero_and_positive() {
        assert_eq!(check_time(0.0).unwrap(), 0.0);
        assert_eq!(check_time(3.5).unwrap(), 3.5);
    }

    #[test]
    fn check_time_rejects_negative_and_nan() {
        assert!(matches!(check_time(-0.1), Err(SchedulerError::InvalidTime(_))));
        assert!(check_time(f64::NAN).is_err());
        assert!(check_time(f64::INFINITY).is_err());
    }

    #[test]
    fn display_includes_context() {
        let err = SchedulerError::reference("sequence", "verse");
        assert_eq!(err.to_string(), "unknown sequence 'verse'");
        let err = SchedulerError::MalformedEvent {
            event: "0 note".into(),
            reason: "expected 3 arguments, got 0".into(),
        };
        assert!(err.to_string().contains("0 note"));
        assert!(err.is_event_scoped());
        assert!(!SchedulerError::state("not playing").is_event_scoped());
    }
}
