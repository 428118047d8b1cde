//! Bearer token authentication.
//!
//! The token is given inline (`token:<jwt>` or just `<jwt>`) or read from a file
//! (`file:/path/to/token`, `file:///path/to/token`). File tokens are re-read
//! on every [`Authentication::refresh`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::{AuthData, AuthParams, Authentication, Error, Result};

#[derive(Debug, Clone)]
enum TokenSource {
    Inline,
    File(PathBuf),
}

/// Sends `Authorization: Bearer <token>`.
pub struct AuthenticationToken {
    source: TokenSource,
    token: ArcSwap<String>,
}

impl std::fmt::Debug for AuthenticationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationToken")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl AuthenticationToken {
    /// Registry name.
    pub const NAME: &'static str = "token";

    /// Provider for an inline token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            source: TokenSource::Inline,
            token: ArcSwap::from_pointee(token.into()),
        }
    }

    /// Provider reading its token from a file.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let token = read_token(&path)?;
        Ok(Self {
            source: TokenSource::File(path),
            token: ArcSwap::from_pointee(token),
        })
    }

    /// Build from a `token` or `file` param, or a bare token string.
    pub fn from_params(params: &AuthParams) -> Result<Self> {
        if let Some(token) = params.get("token") {
            return Ok(Self::new(token));
        }
        if let Some(file) = params.get("file") {
            // `file:///abs/path` arrives as `///abs/path`
            let path = file.strip_prefix("//").unwrap_or(file);
            return Self::from_file(path);
        }
        if let Some(token) = params.bare() {
            return Ok(Self::new(token));
        }
        Err(Error::unsupported_authentication(
            Self::NAME,
            "missing required param 'token' or 'file'",
        ))
    }
}

fn read_token(path: &Path) -> Result<String> {
    let token = std::fs::read_to_string(path).map_err(|e| {
        Error::unsupported_authentication(
            AuthenticationToken::NAME,
            format!("cannot read token file '{}': {e}", path.display()),
        )
    })?;
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::unsupported_authentication(
            AuthenticationToken::NAME,
            format!("token file '{}' is empty", path.display()),
        ));
    }
    Ok(token.to_string())
}

impl Authentication for AuthenticationToken {
    fn auth_method_name(&self) -> &str {
        Self::NAME
    }

    fn auth_data(&self) -> Result<AuthData> {
        let token = self.token.load();
        Ok(AuthData::header("Authorization", format!("Bearer {token}")))
    }

    fn refresh(&self) -> Result<()> {
        if let TokenSource::File(path) = &self.source {
            let token = read_token(path)?;
            self.token.store(Arc::new(token));
            debug!(path = %path.display(), "token reloaded");
        }
        Ok(())
    }
}
