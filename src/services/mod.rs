//! Domain operations. Each function takes a pooled `PgConnection` and returns
//! `ServiceResult`, leaving HTTP concerns to the handlers.

pub mod boards;
pub mod columns;
pub mod dictionaries;
pub mod directory;
pub mod projects;
pub mod roles;
pub mod users;
