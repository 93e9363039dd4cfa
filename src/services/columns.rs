//! Kanban columns: creation, partial updates, atomic reordering and deletion.

use diesel::prelude::*;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::SessionContext;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{KanbanColumn, NewKanbanColumn};
use crate::schema::{kanban_columns, projects};

use super::boards::{ensure_board_access, find_board};

#[derive(Debug, Clone, Copy, Deserialize, ToSchema, Validate)]
pub struct ReorderItem {
    pub id: i32,
    #[validate(range(min = 0))]
    pub position: i32,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = kanban_columns)]
pub struct ColumnChanges {
    pub name: Option<String>,
    pub position: Option<i32>,
    pub color: Option<Option<String>>,
    pub description: Option<Option<String>>,
}

impl ColumnChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.position.is_none()
            && self.color.is_none()
            && self.description.is_none()
    }
}

/// Position for a column appended after `max`. An empty board starts at 0.
pub fn next_position(max: Option<i32>) -> i32 {
    max.map_or(0, |m| m + 1)
}

/// Checks a reorder request against the columns that were found for it and
/// returns the single board they all belong to.
pub fn plan_reorder(items: &[ReorderItem], found: &[KanbanColumn]) -> ServiceResult<i32> {
    let mut seen = HashSet::with_capacity(items.len());
    if let Some(dup) = items.iter().find(|item| !seen.insert(item.id)) {
        return Err(ServiceError::bad_request(format!(
            "Column {} appears more than once",
            dup.id
        )));
    }

    let found_ids: HashSet<i32> = found.iter().map(|c| c.id).collect();
    let missing: Vec<String> = items
        .iter()
        .filter(|item| !found_ids.contains(&item.id))
        .map(|item| item.id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ServiceError::not_found(format!(
            "One or more columns not found: {}",
            missing.join(", ")
        )));
    }

    let boards: BTreeSet<i32> = found.iter().map(|c| c.board_id).collect();
    match (boards.len(), boards.first()) {
        (1, Some(board_id)) => Ok(*board_id),
        _ => Err(ServiceError::bad_request(
            "All columns to reorder must belong to the same board",
        )),
    }
}

fn column_not_found(id: i32) -> ServiceError {
    ServiceError::not_found(format!("Kanban column with id {} not found", id))
}

fn find_column(conn: &mut PgConnection, id: i32) -> ServiceResult<KanbanColumn> {
    kanban_columns::table
        .find(id)
        .select(KanbanColumn::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| column_not_found(id))
}

fn load_board_columns(conn: &mut PgConnection, board_id: i32) -> ServiceResult<Vec<KanbanColumn>> {
    Ok(kanban_columns::table
        .filter(kanban_columns::board_id.eq(board_id))
        .order((kanban_columns::position.asc(), kanban_columns::id.asc()))
        .select(KanbanColumn::as_select())
        .load(conn)?)
}

#[instrument(skip(conn, color, description))]
pub fn create_column(
    conn: &mut PgConnection,
    board_id: i32,
    name: &str,
    position: Option<i32>,
    color: Option<String>,
    description: Option<String>,
) -> ServiceResult<KanbanColumn> {
    conn.transaction(|conn| {
        if find_board(conn, board_id)?.is_none() {
            return Err(ServiceError::not_found(format!(
                "Kanban board with id {} not found",
                board_id
            )));
        }

        let position = match position {
            Some(p) => p,
            None => {
                let max: Option<i32> = kanban_columns::table
                    .filter(kanban_columns::board_id.eq(board_id))
                    .select(diesel::dsl::max(kanban_columns::position))
                    .first(conn)?;
                next_position(max)
            }
        };

        let column = diesel::insert_into(kanban_columns::table)
            .values(&NewKanbanColumn {
                board_id,
                name: name.to_string(),
                position,
                color,
                description,
            })
            .returning(KanbanColumn::as_returning())
            .get_result(conn)?;

        info!(column_id = column.id, board_id, position, "Kanban column created");
        Ok(column)
    })
}

#[instrument(skip(conn, changes))]
pub fn update_column(
    conn: &mut PgConnection,
    id: i32,
    changes: ColumnChanges,
) -> ServiceResult<KanbanColumn> {
    let column = find_column(conn, id)?;
    if changes.is_empty() {
        return Ok(column);
    }

    let column = diesel::update(kanban_columns::table.find(id))
        .set((&changes, kanban_columns::updated_at.eq(diesel::dsl::now)))
        .returning(KanbanColumn::as_returning())
        .get_result(conn)?;

    info!(column_id = id, "Kanban column updated");
    Ok(column)
}

/// Columns of one board ordered by `(position, id)`.
pub fn list_board_columns(
    conn: &mut PgConnection,
    session: &SessionContext,
    board_id: i32,
) -> ServiceResult<Vec<KanbanColumn>> {
    ensure_board_access(conn, session, board_id)?;

    if find_board(conn, board_id)?.is_none() {
        return Err(ServiceError::not_found(format!(
            "Kanban board with id {} not found",
            board_id
        )));
    }

    load_board_columns(conn, board_id)
}

/// Writes every position. Callers own the surrounding transaction.
pub fn apply_positions(conn: &mut PgConnection, items: &[ReorderItem]) -> ServiceResult<()> {
    for item in items {
        let updated = diesel::update(kanban_columns::table.find(item.id))
            .set((
                kanban_columns::position.eq(item.position),
                kanban_columns::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;
        if updated == 0 {
            return Err(column_not_found(item.id));
        }
    }
    Ok(())
}

/// Moves several columns of one board at once. Either every position changes
/// or none does.
#[instrument(skip(conn, session, items), fields(user_id = session.user_id, count = items.len()))]
pub fn reorder_columns(
    conn: &mut PgConnection,
    session: &SessionContext,
    items: &[ReorderItem],
) -> ServiceResult<Vec<KanbanColumn>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    conn.transaction(|conn| {
        let ids: Vec<i32> = items.iter().map(|item| item.id).collect();
        let found: Vec<KanbanColumn> = kanban_columns::table
            .filter(kanban_columns::id.eq_any(&ids))
            .select(KanbanColumn::as_select())
            .for_update()
            .load(conn)?;

        let board_id = plan_reorder(items, &found)?;
        ensure_board_access(conn, session, board_id)?;

        apply_positions(conn, items)?;

        info!(board_id, "Kanban columns reordered");
        load_board_columns(conn, board_id)
    })
}

#[instrument(skip(conn, session), fields(user_id = session.user_id))]
pub fn delete_column(
    conn: &mut PgConnection,
    session: &SessionContext,
    id: i32,
) -> ServiceResult<()> {
    conn.transaction(|conn| {
        let column = find_column(conn, id)?;
        ensure_board_access(conn, session, column.board_id)?;

        let project_count: i64 = projects::table
            .filter(projects::kanban_column_id.eq(id))
            .count()
            .get_result(conn)?;
        if project_count > 0 {
            warn!(column_id = id, project_count, "Refusing to delete non-empty column");
            return Err(ServiceError::conflict(format!(
                "Cannot delete column with {} project(s). Move them to another column first",
                project_count
            )));
        }

        diesel::delete(kanban_columns::table.find(id)).execute(conn)?;
        info!(column_id = id, board_id = column.board_id, "Kanban column deleted");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(id: i32, board_id: i32, position: i32) -> KanbanColumn {
        let now = chrono::Utc::now().naive_utc();
        KanbanColumn {
            id,
            board_id,
            name: format!("col-{}", id),
            position,
            color: None,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(id: i32, position: i32) -> ReorderItem {
        ReorderItem { id, position }
    }

    #[test]
    fn test_next_position_starts_at_zero() {
        assert_eq!(next_position(None), 0);
    }

    #[test]
    fn test_next_position_appends_after_max() {
        assert_eq!(next_position(Some(0)), 1);
        assert_eq!(next_position(Some(7)), 8);
    }

    #[test]
    fn test_plan_reorder_returns_common_board() {
        let found = vec![column(1, 4, 0), column(2, 4, 1)];
        let board = plan_reorder(&[item(1, 1), item(2, 0)], &found).unwrap();
        assert_eq!(board, 4);
    }

    #[test]
    fn test_plan_reorder_lists_all_missing_ids() {
        let found = vec![column(1, 4, 0)];
        let err = plan_reorder(&[item(1, 0), item(8, 1), item(9, 2)], &found).unwrap_err();
        match err {
            ServiceError::NotFound(message) => {
                assert_eq!(message, "One or more columns not found: 8, 9")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plan_reorder_rejects_cross_board() {
        let found = vec![column(1, 4, 0), column(2, 5, 0)];
        let err = plan_reorder(&[item(1, 1), item(2, 0)], &found).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
        assert_eq!(
            err.to_string(),
            "All columns to reorder must belong to the same board"
        );
    }

    #[test]
    fn test_plan_reorder_rejects_duplicate_ids() {
        let found = vec![column(1, 4, 0)];
        let err = plan_reorder(&[item(1, 1), item(1, 0)], &found).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[test]
    fn test_reorder_item_rejects_negative_position() {
        assert!(item(1, -1).validate().is_err());
        assert!(item(1, 0).validate().is_ok());
    }

    #[test]
    fn test_empty_column_changes() {
        assert!(ColumnChanges::default().is_empty());
        let changes = ColumnChanges {
            color: Some(None),
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }
}
