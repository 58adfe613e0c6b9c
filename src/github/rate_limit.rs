//! Reset time attached to GitHub rate-limit failures.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// When the quota window that refused a request resets.
///
/// # Example
///
/// ```
/// use reprise::github::RateLimitInfo;
///
/// let info = RateLimitInfo::new(1_700_000_000);
/// assert_eq!(info.to_string(), "resets at 2023-11-14T22:13:20Z");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    reset_at: u64,
}

impl RateLimitInfo {
    /// Wraps the Unix timestamp GitHub reports for the window reset.
    #[must_use]
    pub const fn new(reset_at: u64) -> Self {
        Self { reset_at }
    }
}

impl fmt::Display for RateLimitInfo {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reset = i64::try_from(self.reset_at)
            .ok()
            .and_then(|seconds| DateTime::<Utc>::from_timestamp(seconds, 0));
        match reset {
            Some(time) => write!(
                formatter,
                "resets at {}",
                time.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            None => write!(formatter, "resets at unix time {}", self.reset_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RateLimitInfo;

    #[test]
    fn out_of_range_reset_falls_back_to_raw_seconds() {
        assert_eq!(
            RateLimitInfo::new(u64::MAX).to_string(),
            format!("resets at unix time {}", u64::MAX)
        );
    }
}
