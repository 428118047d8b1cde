//! HTTP basic authentication.

use base64::Engine;

use crate::{AuthData, AuthParams, Authentication, Result};

/// Sends `Authorization: Basic <base64(userId:password)>`.
#[derive(Clone)]
pub struct AuthenticationBasic {
    user_id: String,
    /// Base64-encoded "userId:password".
    encoded_credentials: String,
}

impl std::fmt::Debug for AuthenticationBasic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationBasic")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl AuthenticationBasic {
    /// Registry name.
    pub const NAME: &'static str = "basic";

    /// Create a provider for the given credentials.
    pub fn new(user_id: impl Into<String>, password: impl AsRef<str>) -> Self {
        let user_id = user_id.into();
        let credentials = format!("{user_id}:{}", password.as_ref());
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        Self {
            user_id,
            encoded_credentials: encoded,
        }
    }

    /// Build from `userId` and `password` params.
    pub fn from_params(params: &AuthParams) -> Result<Self> {
        let user_id = params.require(Self::NAME, "userId")?;
        let password = params.require(Self::NAME, "password")?;
        Ok(Self::new(user_id, password))
    }
}

impl Authentication for AuthenticationBasic {
    fn auth_method_name(&self) -> &str {
        Self::NAME
    }

    fn auth_data(&self) -> Result<AuthData> {
        Ok(AuthData::header(
            "Authorization",
            format!("Basic {}", self.encoded_credentials),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_encodes_correctly() {
        // "user:pass" -> "dXNlcjpwYXNz"
        let auth = AuthenticationBasic::new("user", "pass");
        let data = auth.auth_data().expect("auth data");
        assert_eq!(
            data.headers(),
            [("Authorization".to_string(), "Basic dXNlcjpwYXNz".to_string())]
        );
    }

    #[test]
    fn debug_hides_password() {
        let auth = AuthenticationBasic::new("admin", "s3cr3t");
        let debug = format!("{auth:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("s3cr3t"));
        assert!(!debug.contains(&auth.encoded_credentials));
    }
}
