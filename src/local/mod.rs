//! Git subprocess execution for working clones and the reference cache.
//!
//! The engine never links against libgit2 for mutations; it drives the
//! `git` porcelain through [`GitRunner`] so credentials, progress output and
//! cancellation behave exactly as they do on the command line.
//!
//! # Example
//!
//! ```no_run
//! use reprise::local::{CommandGitRunner, GitCommand, GitRunner};
//!
//! # async fn demo() -> Result<(), reprise::local::GitCommandError> {
//! let runner = CommandGitRunner::default();
//! let output = runner.run(&GitCommand::new(["--version"])).await?;
//! println!("{}", output.trimmed_stdout());
//! # Ok(())
//! # }
//! ```

mod command;
mod error;
mod remote;
mod runner;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use command::GitCommand;
pub use error::GitCommandError;
pub use remote::{RemoteBase, RemoteUrl};
pub use runner::{CommandGitRunner, GitOutput, GitRunner};
