use std::error::Error;

use pipeaudit_core::AppError;

use super::RetryTier;

/// Message fragments that mark a failure as transient for every tier.
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection",
    "timeout",
    "timed out",
    "network",
    "deadlock",
    "resource busy",
    "temporarily unavailable",
    "too many connections",
    "broken pipe",
    "reset by peer",
    "unreachable",
];

/// Vendor error codes treated as transient by every tier.
const BASE_VENDOR_CODES: &[&str] = &[
    "ora-00060",
    "ora-00054",
    "ora-12170",
    "sqlstate 40p01",
    "sqlstate 08006",
    "sqlstate 08001",
];

/// Additional vendor codes recognised by the aggressive tier.
const AGGRESSIVE_VENDOR_CODES: &[&str] = &[
    "ora-12541",
    "ora-12514",
    "ora-12528",
    "ora-12537",
    "ora-03113",
    "ora-03114",
    "ora-01033",
    "ora-08177",
    "sqlstate 40001",
    "sqlstate 53300",
    "sqlstate 57p01",
    "sqlstate 57p03",
    "sqlstate 08003",
    "sqlstate 08004",
];

pub(super) fn is_transient(tier: RetryTier, error: &AppError) -> bool {
    let text = normalized_text(error);

    let matches_any = |needles: &[&str]| needles.iter().any(|needle| text.contains(needle));

    matches_any(TRANSIENT_PATTERNS)
        || matches_any(BASE_VENDOR_CODES)
        || (tier == RetryTier::Aggressive && matches_any(AGGRESSIVE_VENDOR_CODES))
}

fn normalized_text(error: &AppError) -> String {
    let mut text = error.to_string().to_lowercase();
    let mut source = error.source();

    while let Some(cause) = source {
        text.push_str(" | ");
        text.push_str(&cause.to_string().to_lowercase());
        source = cause.source();
    }

    text
}
