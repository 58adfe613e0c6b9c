//! Scripted [`GitRunner`] for exercising engine logic without git, plus
//! `git2` helpers for seeding real repositories.
//!
//! Scripted commands succeed with empty output unless a rule whose argument
//! prefix matches says otherwise. Every invocation is recorded for
//! assertions.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{GitCommand, GitCommandError, GitOutput, GitRunner};

#[derive(Debug, Clone)]
struct Rule {
    prefix: Vec<String>,
    outcome: Result<GitOutput, String>,
    remaining: Option<usize>,
}

/// Fake git runner driven by prefix rules.
///
/// # Example
///
/// ```
/// use reprise::local::test_support::ScriptedGitRunner;
///
/// let runner = ScriptedGitRunner::new().fail_once(&["cherry-pick"], "conflict");
/// assert!(runner.calls().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct ScriptedGitRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<GitCommand>>,
}

impl ScriptedGitRunner {
    /// Runner on which every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push_rule(
        self,
        prefix: &[&str],
        outcome: Result<GitOutput, String>,
        remaining: Option<usize>,
    ) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Rule {
                prefix: prefix.iter().map(|arg| (*arg).to_owned()).collect(),
                outcome,
                remaining,
            });
        self
    }

    /// Commands starting with `prefix` print `stdout`.
    #[must_use]
    pub fn respond(self, prefix: &[&str], stdout: &str) -> Self {
        let output = GitOutput {
            stdout: stdout.to_owned(),
            stderr: String::new(),
        };
        self.push_rule(prefix, Ok(output), None)
    }

    /// The next command starting with `prefix` fails with `stderr`.
    #[must_use]
    pub fn fail_once(self, prefix: &[&str], stderr: &str) -> Self {
        self.push_rule(prefix, Err(stderr.to_owned()), Some(1))
    }

    /// Every command starting with `prefix` fails with `stderr`.
    #[must_use]
    pub fn fail_always(self, prefix: &[&str], stderr: &str) -> Self {
        self.push_rule(prefix, Err(stderr.to_owned()), None)
    }

    /// Arguments of every command run so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|command| command.args().to_vec())
            .collect()
    }

    /// Redacted command lines run so far.
    #[must_use]
    pub fn displayed_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(GitCommand::display)
            .collect()
    }

    /// Number of recorded commands starting with `prefix`.
    #[must_use]
    pub fn count(&self, prefix: &[&str]) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|command| command.starts_with(prefix))
            .count()
    }

    fn outcome_for(&self, command: &GitCommand) -> Result<GitOutput, GitCommandError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());

        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        let matched = rules.iter_mut().find(|rule| {
            let prefix: Vec<&str> = rule.prefix.iter().map(String::as_str).collect();
            rule.remaining != Some(0) && command.starts_with(&prefix)
        });

        let Some(rule) = matched else {
            return Ok(GitOutput::default());
        };
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        rule.outcome.clone().map_err(|stderr| GitCommandError::Failed {
            command: command.display(),
            status: "exit status: 1".to_owned(),
            stderr,
        })
    }
}

#[async_trait]
impl GitRunner for ScriptedGitRunner {
    async fn run(&self, command: &GitCommand) -> Result<GitOutput, GitCommandError> {
        self.outcome_for(command)
    }

    async fn run_streaming(
        &self,
        command: &GitCommand,
        on_line: &(dyn for<'line> Fn(&'line str) + Send + Sync),
    ) -> Result<GitOutput, GitCommandError> {
        let outcome = self.outcome_for(command);
        if let Ok(output) = &outcome {
            output.stderr.lines().for_each(on_line);
        }
        outcome
    }
}

/// Writes a commit that sets `path` to `contents` on top of `parent`,
/// without touching the working tree.
///
/// `reference` is updated to the new commit when given.
///
/// # Errors
///
/// Returns the underlying [`git2::Error`] when the object database rejects
/// a write.
pub fn commit_file(
    repository: &git2::Repository,
    reference: Option<&str>,
    parent: Option<git2::Oid>,
    path: &str,
    contents: &str,
    message: &str,
) -> Result<git2::Oid, git2::Error> {
    let signature = git2::Signature::now("Reprise Tests", "tests@example.com")?;
    let parent_commit = parent
        .map(|oid| repository.find_commit(oid))
        .transpose()?;
    let parent_tree = parent_commit.as_ref().map(git2::Commit::tree).transpose()?;

    let blob = repository.blob(contents.as_bytes())?;
    let mut builder = repository.treebuilder(parent_tree.as_ref())?;
    builder.insert(path, blob, 0o100_644)?;
    let tree = repository.find_tree(builder.write()?)?;

    let parents: Vec<&git2::Commit<'_>> = parent_commit.iter().collect();
    repository.commit(reference, &signature, &signature, message, &tree, &parents)
}

/// Points `HEAD` at `branch` and checks it out, replacing the index and
/// working tree.
///
/// # Errors
///
/// Returns the underlying [`git2::Error`] when the checkout fails.
pub fn checkout_branch(repository: &git2::Repository, branch: &str) -> Result<(), git2::Error> {
    repository.set_head(&format!("refs/heads/{branch}"))?;
    repository.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
}
