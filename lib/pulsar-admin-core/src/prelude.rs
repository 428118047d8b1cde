//! Prelude module for authentication plugin authors.
//!
//! ```ignore
//! use pulsar_admin_core::prelude::*;
//! ```

pub use crate::{AuthData, AuthParams, Authentication, Error, Result};
