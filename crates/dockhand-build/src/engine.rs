//! Container engine abstraction.

use crate::error::EngineResult;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::fmt;
use std::path::Path;

/// Image produced by a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    pub id: String,
    pub tags: Vec<String>,
}

/// One status record emitted while pushing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushProgress {
    pub status: Option<String>,
    pub progress: Option<String>,
    /// Set when the engine reports the push as failed.
    pub error: Option<String>,
}

impl fmt::Display for PushProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.progress) {
            (Some(status), Some(progress)) => write!(f, "{} {}", status, progress),
            (Some(status), None) => write!(f, "{}", status),
            (None, Some(progress)) => write!(f, "{}", progress),
            (None, None) => Ok(()),
        }
    }
}

/// Registry login for a single push.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryLogin {
    pub username: String,
    pub password: String,
}

impl RegistryLogin {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for RegistryLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryLogin")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Build and publish capability the executor drives.
///
/// Logins are passed per call rather than stored on the engine, so one engine
/// can be shared by concurrent jobs pushing as different users.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build `context_dir` using `dockerfile` inside it, tagging the result
    /// as `reference`.
    async fn build_image(
        &self,
        context_dir: &Path,
        dockerfile: &str,
        reference: &str,
    ) -> EngineResult<BuiltImage>;

    /// Check a login before it is used for a push.
    ///
    /// How far the check goes is up to the engine. The Docker engine only
    /// rejects incomplete logins here; the registry itself judges the login
    /// when `push` presents it and reports a rejection on the push stream.
    async fn authenticate(&self, login: &RegistryLogin) -> EngineResult<()>;

    /// Push `reference`, yielding the engine's progress records.
    fn push<'a>(
        &'a self,
        reference: &'a str,
        login: Option<&'a RegistryLogin>,
    ) -> BoxStream<'a, EngineResult<PushProgress>>;
}
