//! Error mapping helpers for the Octocrab GitHub gateway implementation.

use http::StatusCode;

use crate::github::error::IntakeError;

/// Checks if a GitHub error status indicates an authentication failure.
pub(super) const fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Checks if an octocrab error represents a network/transport issue.
pub(super) const fn is_network_error(error: &octocrab::Error) -> bool {
    matches!(
        error,
        octocrab::Error::Http { .. }
            | octocrab::Error::Hyper { .. }
            | octocrab::Error::Service { .. }
    )
}

/// Checks whether the GitHub error represents a rate limit error based on the
/// HTTP status and message / documentation URL content.
pub(super) fn is_rate_limit_error(source: &octocrab::GitHubError) -> bool {
    let is_rate_limit_status = matches!(
        source.status_code,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
    );

    let message_indicates_rate_limit = source.message.to_lowercase().contains("rate limit")
        || source
            .documentation_url
            .as_deref()
            .is_some_and(|url| url.contains("rate-limit"));

    is_rate_limit_status && message_indicates_rate_limit
}

pub(super) fn map_octocrab_error(operation: &str, error: &octocrab::Error) -> IntakeError {
    if let octocrab::Error::GitHub { source, .. } = error {
        return map_status(operation, source.status_code, &source.message);
    }

    if is_network_error(error) {
        return IntakeError::Network {
            message: format!("{operation} failed: {error}"),
        };
    }

    IntakeError::Api {
        message: format!("{operation} failed: {error}"),
    }
}

pub(super) fn map_http_error(
    operation: &str,
    status: StatusCode,
    maybe_message: Option<String>,
) -> IntakeError {
    let message = maybe_message.unwrap_or_else(|| "unknown error".to_owned());
    map_status(operation, status, &message)
}

fn map_status(operation: &str, status: StatusCode, message: &str) -> IntakeError {
    if status == StatusCode::NOT_FOUND {
        return IntakeError::NotFound {
            resource: operation.to_owned(),
        };
    }

    if is_auth_failure(status) {
        IntakeError::Authentication {
            message: format!("{operation} failed: GitHub returned {status} {message}"),
        }
    } else {
        IntakeError::Api {
            message: format!("{operation} failed with status {status}: {message}"),
        }
    }
}

/// Maps a failed pull request creation, recognising the two validation
/// failures the publisher recovers from.
pub(super) fn map_create_pull_request_error(
    error: &octocrab::Error,
    head: &str,
    base: &str,
) -> IntakeError {
    if let octocrab::Error::GitHub { source, .. } = error
        && source.status_code == StatusCode::UNPROCESSABLE_ENTITY
    {
        let details = source.errors.as_deref().unwrap_or_default();
        if mentions_existing_pull_request(&source.message, details) {
            return IntakeError::DuplicatePullRequest {
                head: head.to_owned(),
            };
        }
        if rejects_field(details, "base") {
            return IntakeError::InvalidBaseBranch {
                base: base.to_owned(),
            };
        }
    }

    map_octocrab_error("create pull request", error)
}

fn mentions_existing_pull_request(message: &str, details: &[serde_json::Value]) -> bool {
    let matches = |text: &str| text.to_lowercase().contains("already exists");
    matches(message)
        || details.iter().any(|detail| {
            detail
                .get("message")
                .and_then(serde_json::Value::as_str)
                .is_some_and(matches)
        })
}

fn rejects_field(details: &[serde_json::Value], field: &str) -> bool {
    details.iter().any(|detail| {
        detail.get("field").and_then(serde_json::Value::as_str) == Some(field)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{mentions_existing_pull_request, rejects_field};

    #[test]
    fn duplicate_detection_reads_nested_messages() {
        let details = vec![json!({
            "resource": "PullRequest",
            "code": "custom",
            "message": "A pull request already exists for acme-review:review-pr-42."
        })];
        assert!(mentions_existing_pull_request("Validation Failed", &details));
    }

    #[test]
    fn base_field_rejection_is_detected() {
        let details = vec![json!({ "resource": "PullRequest", "field": "base", "code": "invalid" })];
        assert!(rejects_field(&details, "base"));
        assert!(!rejects_field(&details, "head"));
    }
}
