//! Built-in authentication providers.
//!
//! | Plugin | Params | Credentials |
//! |--------|--------|-------------|
//! | `token` | `token` or `file` | `Authorization: Bearer <token>` |
//! | `basic` | `userId`, `password` | `Authorization: Basic <base64>` |
//! | `disabled` | none | none |

mod basic;
mod token;

pub use basic::AuthenticationBasic;
pub use token::AuthenticationToken;

use crate::{AuthData, Authentication, Result};

/// Provider sending no credentials; used when no authentication is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticationDisabled;

impl AuthenticationDisabled {
    /// Registry name.
    pub const NAME: &'static str = "disabled";
}

impl Authentication for AuthenticationDisabled {
    fn auth_method_name(&self) -> &str {
        "none"
    }

    fn auth_data(&self) -> Result<AuthData> {
        Ok(AuthData::none())
    }
}
