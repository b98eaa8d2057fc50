//! Failure classification for remote-call errors
//!
//! Pure function of the error text. Throttle notices carry the wait in
//! seconds; ban markers are the remote's account-level rejections. Anything
//! else is transient.

use std::sync::LazyLock;

use regex::Regex;
use session::{FailureClass, SessionError};

/// Throttle notices, matched against the uppercased message. Each pattern
/// captures the wait in seconds.
static THROTTLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"FLOOD_WAIT \((\d+)\)",
        r"FLOOD_WAIT_(\d+)",
        r"FLOOD_PREMIUM_WAIT_(\d+)",
        r"A WAIT OF (\d+) SECONDS",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

const BAN_MARKERS: &[&str] = &[
    "PHONE_NUMBER_BANNED",
    "USER_DEACTIVATED",
    "AUTH_KEY_UNREGISTERED",
    "SESSION_REVOKED",
];

/// Classify a failure message. A throttle notice is checked before the ban
/// markers.
pub fn classify_message(message: &str) -> FailureClass {
    let upper = message.to_uppercase();

    for pattern in THROTTLE_PATTERNS.iter() {
        if let Some(secs) = pattern
            .captures(&upper)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        {
            return FailureClass::Throttle(secs);
        }
    }

    if BAN_MARKERS.iter().any(|marker| upper.contains(marker)) {
        return FailureClass::Banned;
    }

    FailureClass::Transient
}

pub fn classify(error: &SessionError) -> FailureClass {
    classify_message(&error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flood_wait_with_parenthesised_seconds() {
        assert_eq!(
            classify_message("RPC error 420: FLOOD_WAIT (42)"),
            FailureClass::Throttle(42)
        );
    }

    #[test]
    fn flood_wait_suffix_forms() {
        assert_eq!(classify_message("FLOOD_WAIT_30"), FailureClass::Throttle(30));
        assert_eq!(
            classify_message("flood_premium_wait_7 on upload"),
            FailureClass::Throttle(7)
        );
    }

    #[test]
    fn human_readable_wait_notice() {
        assert_eq!(
            classify_message("A wait of 120 seconds is required (caused by ResolveUsername)"),
            FailureClass::Throttle(120)
        );
    }

    #[test]
    fn ban_markers() {
        for msg in [
            "The used phone number has been banned: PHONE_NUMBER_BANNED",
            "user_deactivated",
            "AUTH_KEY_UNREGISTERED",
            "rpc error: SESSION_REVOKED",
        ] {
            assert_eq!(classify_message(msg), FailureClass::Banned, "{msg}");
        }
    }

    #[test]
    fn wait_is_checked_before_ban_markers() {
        assert_eq!(
            classify_message("USER_DEACTIVATED after FLOOD_WAIT_10"),
            FailureClass::Throttle(10)
        );
    }

    #[test]
    fn everything_else_is_transient() {
        assert_eq!(classify_message("connection reset by peer"), FailureClass::Transient);
        assert_eq!(classify_message(""), FailureClass::Transient);
        assert_eq!(classify_message("FLOOD_WAIT_"), FailureClass::Transient);
    }

    #[test]
    fn classifies_session_errors_by_text() {
        let err = SessionError::Remote("FLOOD_WAIT_15".into());
        assert_eq!(classify(&err), FailureClass::Throttle(15));
        let err = SessionError::Dial("timed out".into());
        assert_eq!(classify(&err), FailureClass::Transient);
    }
}
