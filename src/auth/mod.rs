//! Authentication for GitHub and GitLab
//!
//! Tokens come from environment variables: the one named in the provider's
//! configuration, else the conventional variables for its kind.

use crate::error::{Error, Result};
use crate::types::ProviderKind;

/// Variables consulted for GitHub when none is configured
pub const GITHUB_TOKEN_VARS: &[&str] = &["GITHUB_TOKEN", "GH_TOKEN"];

/// Variables consulted for GitLab when none is configured
pub const GITLAB_TOKEN_VARS: &[&str] = &["GITLAB_TOKEN", "GL_TOKEN"];

/// Source of authentication token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSource {
    /// Variable named in the configuration
    Configured(String),
    /// Conventional variable for the provider kind
    Default(String),
}

/// A resolved token
#[derive(Clone)]
pub struct AuthToken {
    /// The token
    pub token: String,
    /// Where it came from
    pub source: AuthSource,
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Resolve a token from the process environment
pub fn resolve_token(kind: ProviderKind, token_env: Option<&str>) -> Result<AuthToken> {
    resolve_token_with(kind, token_env, |name| std::env::var(name).ok())
}

/// Resolve a token using `lookup` to read variables
pub fn resolve_token_with<F>(kind: ProviderKind, token_env: Option<&str>, lookup: F) -> Result<AuthToken>
where
    F: Fn(&str) -> Option<String>,
{
    let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(var) = token_env {
        return present(var)
            .map(|token| AuthToken {
                token,
                source: AuthSource::Configured(var.to_string()),
            })
            .ok_or_else(|| Error::Auth(format!("{kind} token variable {var} is not set")));
    }

    let defaults = match kind {
        ProviderKind::GitHub => GITHUB_TOKEN_VARS,
        ProviderKind::GitLab => GITLAB_TOKEN_VARS,
    };
    defaults
        .iter()
        .find_map(|&var| {
            present(var).map(|token| AuthToken {
                token,
                source: AuthSource::Default(var.to_string()),
            })
        })
        .ok_or_else(|| {
            Error::Auth(format!(
                "no {kind} token found; set one of {}",
                defaults.join(", ")
            ))
        })
}
