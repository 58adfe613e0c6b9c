//! Clone URLs for GitHub repositories.
//!
//! HTTPS hosts receive `x-access-token` credentials embedded in the URL so
//! git never prompts. Local directories (`file://` URLs or plain paths) are
//! supported for offline use and tests, and carry no credentials.

use camino::Utf8PathBuf;
use url::Url;

use crate::github::{PersonalAccessToken, RepositoryLocator};

use super::error::GitCommandError;

/// Base location under which `<owner>/<name>.git` repositories live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteBase {
    /// An HTTP(S) git host such as `https://github.com`.
    Http(Url),
    /// A directory of bare repositories.
    Local(Utf8PathBuf),
}

impl RemoteBase {
    /// Parses a host URL or a local directory.
    ///
    /// # Errors
    ///
    /// Returns [`GitCommandError::InvalidRemote`] for URLs with an
    /// unsupported scheme or an unusable `file://` path.
    pub fn parse(input: &str) -> Result<Self, GitCommandError> {
        let Ok(url) = Url::parse(input) else {
            return Ok(Self::Local(Utf8PathBuf::from(input)));
        };

        match url.scheme() {
            "http" | "https" => Ok(Self::Http(url)),
            "file" => url
                .to_file_path()
                .ok()
                .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
                .map(Self::Local)
                .ok_or_else(|| GitCommandError::InvalidRemote {
                    message: format!("{input} is not a usable local path"),
                }),
            scheme => Err(GitCommandError::InvalidRemote {
                message: format!("unsupported scheme `{scheme}` in {input}"),
            }),
        }
    }

    /// Clone URL for `repository`, authenticated with `token` when the base
    /// is an HTTP host.
    ///
    /// # Errors
    ///
    /// Returns [`GitCommandError::InvalidRemote`] when credentials cannot be
    /// attached to the URL.
    pub fn remote_for(
        &self,
        repository: &RepositoryLocator,
        token: &PersonalAccessToken,
    ) -> Result<RemoteUrl, GitCommandError> {
        let relative = format!(
            "{}/{}.git",
            repository.owner().as_str(),
            repository.repository().as_str()
        );

        match self {
            Self::Local(base) => Ok(RemoteUrl {
                public: base.join(relative).into_string(),
                secret: None,
            }),
            Self::Http(base) => {
                let mut url = base
                    .join(&relative)
                    .map_err(|error| GitCommandError::InvalidRemote {
                        message: error.to_string(),
                    })?;
                let public = url.to_string();
                url.set_username("x-access-token")
                    .and_then(|()| url.set_password(Some(token.value())))
                    .map_err(|()| GitCommandError::InvalidRemote {
                        message: format!("cannot attach credentials to {public}"),
                    })?;
                Ok(RemoteUrl {
                    public: url.to_string(),
                    secret: Some(token.value().to_owned()),
                })
            }
        }
    }

    /// Browser URL for `suffix` within `repository`, for HTTP hosts only.
    #[must_use]
    pub fn web_url(&self, repository: &RepositoryLocator, suffix: &str) -> Option<String> {
        let Self::Http(base) = self else {
            return None;
        };
        base.join(&format!(
            "{}/{}/{}",
            repository.owner().as_str(),
            repository.repository().as_str(),
            suffix.trim_start_matches('/')
        ))
        .ok()
        .map(String::from)
    }
}

/// Clone URL together with the credential it embeds.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    public: String,
    secret: Option<String>,
}

impl RemoteUrl {
    /// Full URL, including credentials where present.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.public
    }

    /// Embedded credential that must be redacted from logs.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    /// URL with the credential removed, safe to persist in git config.
    #[must_use]
    pub fn without_credentials(&self) -> String {
        match Url::parse(&self.public) {
            Ok(mut url) if self.secret.is_some() => {
                // Clearing credentials only fails for cannot-be-a-base URLs.
                if url.set_password(None).is_ok() && url.set_username("").is_ok() {
                    url.to_string()
                } else {
                    self.public.clone()
                }
            }
            _ => self.public.clone(),
        }
    }
}

impl std::fmt::Debug for RemoteUrl {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_tuple("RemoteUrl")
            .field(&self.without_credentials())
            .finish()
    }
}
