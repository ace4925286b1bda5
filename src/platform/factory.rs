//! Provider construction from configuration

use crate::auth::resolve_token;
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::platform::{GitHubProvider, GitLabProvider, Provider};
use crate::types::ProviderKind;
use std::sync::Arc;
use tracing::debug;

/// Build a provider from its configuration, resolving its token
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    let auth = resolve_token(config.kind, config.token_env.as_deref())?;
    debug!(provider = %config.name, kind = %config.kind, source = ?auth.source, "resolved token");

    let host = config.host.as_deref();
    Ok(match config.kind {
        ProviderKind::GitHub => Arc::new(GitHubProvider::new(&config.name, &auth.token, host)?),
        ProviderKind::GitLab => Arc::new(GitLabProvider::new(&config.name, auth.token, host)?),
    })
}
