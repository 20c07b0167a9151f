//! Outcome Classifier — maps the provider's free-text status vocabulary into
//! the closed internal `CallStatus` taxonomy.
//!
//! The provider vocabulary is treated as an open enumeration: anything
//! unrecognized returns `None` ("keep polling"), never silently-completed.
//! Provider strings must not propagate past this function.

use crate::campaign::models::CallStatus;

/// Classifies a raw provider status string.
///
/// `None` means the status is unknown or pre-terminal noise — the poller
/// keeps the entry's current status and polls again.
///
/// Provider `queued` maps to `calling` rather than our own `queued`: a call
/// with a provider id has been launched, and `queued` is reserved for
/// entries that have not consumed a call slot yet.
pub fn classify(raw: &str) -> Option<CallStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "queued" => Some(CallStatus::Calling),
        "ringing" | "in-progress" => Some(CallStatus::InCall),
        "completed" | "ended" => Some(CallStatus::Completed),
        "busy" | "no-answer" | "failed" => Some(CallStatus::NoAnswer),
        "declined" | "rejected" => Some(CallStatus::Declined),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_vocabulary_is_total() {
        assert_eq!(classify("queued"), Some(CallStatus::Calling));
        assert_eq!(classify("ringing"), Some(CallStatus::InCall));
        assert_eq!(classify("in-progress"), Some(CallStatus::InCall));
        assert_eq!(classify("completed"), Some(CallStatus::Completed));
        assert_eq!(classify("ended"), Some(CallStatus::Completed));
        assert_eq!(classify("busy"), Some(CallStatus::NoAnswer));
        assert_eq!(classify("no-answer"), Some(CallStatus::NoAnswer));
        assert_eq!(classify("failed"), Some(CallStatus::NoAnswer));
        assert_eq!(classify("declined"), Some(CallStatus::Declined));
    }

    #[test]
    fn test_unrecognized_status_fails_closed() {
        assert_eq!(classify("provider-maintenance"), None);
        assert_eq!(classify(""), None);
        assert_eq!(classify("done"), None);
    }

    #[test]
    fn test_classification_is_case_and_whitespace_insensitive() {
        assert_eq!(classify("  Completed "), Some(CallStatus::Completed));
        assert_eq!(classify("NO-ANSWER"), Some(CallStatus::NoAnswer));
    }

    #[test]
    fn test_classification_is_idempotent_per_input() {
        // Same provider string always maps to the same status.
        for raw in ["queued", "ringing", "completed", "busy", "declined", "???"] {
            assert_eq!(classify(raw), classify(raw));
        }
    }
}
