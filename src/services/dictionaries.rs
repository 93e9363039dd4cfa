//! Reference data used by projects: regions, statuses and types.
//!
//! The three tables share one shape, so their operations are generated.

use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::error::ServiceError;

fn name_conflict(kind: &'static str, name: &str) -> impl FnOnce(DieselError) -> ServiceError {
    let message = format!("{} '{}' already exists", kind, name);
    move |e| match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            ServiceError::conflict(message)
        }
        other => other.into(),
    }
}

macro_rules! dictionary {
    ($module:ident, $table:ident, $model:ty, $kind:literal, $project_column:ident) => {
        pub mod $module {
            use diesel::prelude::*;
            use tracing::{info, instrument};

            use crate::error::{ServiceError, ServiceResult};
            use crate::schema::{projects, $table};

            type Entry = $model;

            fn not_found(id: i32) -> ServiceError {
                ServiceError::not_found(format!("{} with id {} not found", $kind, id))
            }

            pub fn list(conn: &mut PgConnection) -> ServiceResult<Vec<Entry>> {
                Ok($table::table
                    .order($table::name.asc())
                    .select(Entry::as_select())
                    .load(conn)?)
            }

            pub fn get(conn: &mut PgConnection, id: i32) -> ServiceResult<Entry> {
                $table::table
                    .find(id)
                    .select(Entry::as_select())
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| not_found(id))
            }

            #[instrument(skip(conn))]
            pub fn create(conn: &mut PgConnection, name: &str) -> ServiceResult<Entry> {
                let name = name.trim();
                let entry = diesel::insert_into($table::table)
                    .values($table::name.eq(name))
                    .returning(Entry::as_returning())
                    .get_result(conn)
                    .map_err(super::name_conflict($kind, name))?;

                info!(id = entry.id, "Dictionary entry created");
                Ok(entry)
            }

            #[instrument(skip(conn))]
            pub fn rename(conn: &mut PgConnection, id: i32, name: &str) -> ServiceResult<Entry> {
                let name = name.trim();
                let entry = diesel::update($table::table.find(id))
                    .set($table::name.eq(name))
                    .returning(Entry::as_returning())
                    .get_result(conn)
                    .optional()
                    .map_err(super::name_conflict($kind, name))?
                    .ok_or_else(|| not_found(id))?;

                info!(id, "Dictionary entry renamed");
                Ok(entry)
            }

            /// Refused while any project still points at the entry.
            #[instrument(skip(conn))]
            pub fn delete(conn: &mut PgConnection, id: i32) -> ServiceResult<()> {
                conn.transaction(|conn| {
                    get(conn, id)?;

                    let in_use: i64 = projects::table
                        .filter(projects::$project_column.eq(id))
                        .count()
                        .get_result(conn)?;
                    if in_use > 0 {
                        return Err(ServiceError::conflict(format!(
                            "{} is used by {} project(s)",
                            $kind, in_use
                        )));
                    }

                    diesel::delete($table::table.find(id)).execute(conn)?;
                    info!(id, "Dictionary entry deleted");
                    Ok(())
                })
            }
        }
    };
}

dictionary!(regions, regions, crate::models::Region, "Region", region_id);
dictionary!(
    statuses,
    project_statuses,
    crate::models::ProjectStatus,
    "Project status",
    status_id
);
dictionary!(
    types,
    project_types,
    crate::models::ProjectType,
    "Project type",
    project_type_id
);
