//! HTTP request handlers.

pub mod auth;
pub mod boards;
pub mod columns;
pub mod companies;
pub mod dictionaries;
pub mod health;
pub mod permissions;
pub mod projects;
pub mod roles;
pub mod users;

use serde::{Deserialize, Deserializer};
use validator::Validate;

use crate::error::{ApiError, ApiResult};

/// Runs the derived validators on a request body.
pub fn validate_body<T: Validate>(payload: &T) -> ApiResult<()> {
    payload.validate().map_err(ApiError::validation)
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`). Use with `#[serde(default, deserialize_with = "double_option")]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
