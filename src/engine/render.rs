//! Title and body text for review pull requests.
//!
//! The body is rendered with `minijinja` from a built-in template. It always
//! names the source reference (for example `acme/widgets#42`) so reviewers
//! can trace the reproduction back to its origin.
//!
//! # Template variables
//!
//! - `source_ref`: `owner/name#n` or `owner/name@sha`
//! - `source_url`: browser URL of the source change
//! - `author`: source author login (may be empty)
//! - `strategy`: strategy label
//! - `commit_count`: number of commits reproduced

use minijinja::{Environment, context};
use serde::Serialize;

use super::error::ReproductionError;

/// Prefix applied to every review pull request title.
pub const TITLE_PREFIX: &str = "[Review]";

const BODY_TEMPLATE: &str = "\
Reproduction of {{ source_ref }} for review.

- Source: {{ source_url }}
{% if author %}- Author: @{{ author }}
{% endif %}- Strategy: {{ strategy }}
- Commits: {{ commit_count }}
";

/// Values substituted into the body template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewDescription {
    /// `owner/name#n` or `owner/name@sha`.
    pub source_ref: String,
    /// Browser URL of the source change.
    pub source_url: String,
    /// Source author login, when known.
    pub author: Option<String>,
    /// Strategy label.
    pub strategy: String,
    /// Number of commits reproduced.
    pub commit_count: usize,
}

/// Builds the review title for a source `subject`.
#[must_use]
pub fn review_title(subject: &str) -> String {
    format!("{TITLE_PREFIX} {}", subject.trim())
}

/// Renders the review body.
///
/// # Errors
///
/// Returns [`ReproductionError::Internal`] if the template fails to render.
pub fn render_body(description: &ReviewDescription) -> Result<String, ReproductionError> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);
    env.add_template("body", BODY_TEMPLATE)
        .map_err(|e| ReproductionError::Internal {
            message: format!("invalid body template: {e}"),
        })?;

    let tmpl = env.get_template("body").map_err(|e| ReproductionError::Internal {
        message: format!("failed to retrieve body template: {e}"),
    })?;

    tmpl.render(context! {
        source_ref => &description.source_ref,
        source_url => &description.source_url,
        author => description.author.as_deref().unwrap_or_default(),
        strategy => &description.strategy,
        commit_count => description.commit_count,
    })
    .map_err(|e| ReproductionError::Internal {
        message: format!("body rendering failed: {e}"),
    })
}
