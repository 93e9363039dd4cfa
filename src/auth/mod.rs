//! Credentials, tokens and sessions.

pub mod jwt;
pub mod password;
pub mod session;

pub use jwt::JwtKeys;
pub use password::{PasswordPolicy, PasswordService};
pub use session::{Scope, SessionContext};
