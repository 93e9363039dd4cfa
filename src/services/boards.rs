//! Kanban boards and their membership.
//!
//! Non-admin access to a board is decided by membership alone, and the
//! membership check always runs before anything about the board is read.

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::auth::SessionContext;
use crate::error::{ServiceError, ServiceResult};
use crate::events::{AggregateType, BoardMembershipPayload, EventType, OutboxService};
use crate::models::{
    KanbanBoard, KanbanBoardMember, KanbanColumn, NewKanbanBoard, NewKanbanBoardMember,
};
use crate::schema::{kanban_board_members, kanban_boards, kanban_columns, users};

pub const BOARD_CODE_LENGTH: usize = 10;
const CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ColumnSummary {
    pub id: i32,
    pub name: String,
    pub position: i32,
}

impl From<&KanbanColumn> for ColumnSummary {
    fn from(column: &KanbanColumn) -> Self {
        Self {
            id: column.id,
            name: column.name.clone(),
            position: column.position,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BoardDetail {
    #[serde(flatten)]
    pub board: KanbanBoard,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BoardMemberView {
    pub user_id: i32,
    pub email: String,
    pub full_name: String,
    pub joined_at: chrono::NaiveDateTime,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = kanban_boards)]
pub struct BoardChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

impl BoardChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// URL-safe join code.
pub fn generate_board_code() -> String {
    nanoid::nanoid!(BOARD_CODE_LENGTH)
}

pub fn is_member(conn: &mut PgConnection, board_id: i32, user_id: i32) -> ServiceResult<bool> {
    let found = diesel::select(diesel::dsl::exists(
        kanban_board_members::table
            .filter(kanban_board_members::board_id.eq(board_id))
            .filter(kanban_board_members::user_id.eq(user_id)),
    ))
    .get_result(conn)?;
    Ok(found)
}

/// Admins pass; everyone else must be a member. Unknown boards fail the same
/// way as foreign ones.
pub fn ensure_board_access(
    conn: &mut PgConnection,
    session: &SessionContext,
    board_id: i32,
) -> ServiceResult<()> {
    if session.is_admin || is_member(conn, board_id, session.user_id)? {
        return Ok(());
    }
    warn!(
        user_id = session.user_id,
        board_id, "Board access denied"
    );
    Err(ServiceError::forbidden("Access denied to this board"))
}

fn board_not_found(id: i32) -> ServiceError {
    ServiceError::not_found(format!("Kanban board with id {} not found", id))
}

pub(crate) fn find_board(conn: &mut PgConnection, id: i32) -> ServiceResult<Option<KanbanBoard>> {
    Ok(kanban_boards::table
        .find(id)
        .select(KanbanBoard::as_select())
        .first(conn)
        .optional()?)
}

fn attach_columns(
    conn: &mut PgConnection,
    boards: Vec<KanbanBoard>,
) -> ServiceResult<Vec<BoardDetail>> {
    let ids: Vec<i32> = boards.iter().map(|b| b.id).collect();
    let columns: Vec<KanbanColumn> = kanban_columns::table
        .filter(kanban_columns::board_id.eq_any(&ids))
        .order((
            kanban_columns::board_id.asc(),
            kanban_columns::position.asc(),
            kanban_columns::id.asc(),
        ))
        .select(KanbanColumn::as_select())
        .load(conn)?;

    let mut by_board: HashMap<i32, Vec<ColumnSummary>> = HashMap::new();
    for column in &columns {
        by_board
            .entry(column.board_id)
            .or_default()
            .push(ColumnSummary::from(column));
    }

    Ok(boards
        .into_iter()
        .map(|board| {
            let columns = by_board.remove(&board.id).unwrap_or_default();
            BoardDetail { board, columns }
        })
        .collect())
}

#[instrument(skip(conn))]
pub fn create_board(
    conn: &mut PgConnection,
    name: &str,
    description: Option<String>,
) -> ServiceResult<KanbanBoard> {
    for _ in 0..CODE_ATTEMPTS {
        let new_board = NewKanbanBoard {
            name: name.to_string(),
            description: description.clone(),
            code: generate_board_code(),
        };

        match diesel::insert_into(kanban_boards::table)
            .values(&new_board)
            .returning(KanbanBoard::as_returning())
            .get_result(conn)
        {
            Ok(board) => {
                info!(board_id = board.id, "Kanban board created");
                return Ok(board);
            }
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                warn!("Board code collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ServiceError::Internal(
        "Could not generate a unique board code".to_string(),
    ))
}

/// Admins see every board; members see only their own boards.
pub fn list_boards(
    conn: &mut PgConnection,
    session: &SessionContext,
) -> ServiceResult<Vec<BoardDetail>> {
    let mut query = kanban_boards::table
        .select(KanbanBoard::as_select())
        .order(kanban_boards::id.asc())
        .into_boxed();

    if !session.is_admin {
        query = query.filter(
            kanban_boards::id.eq_any(
                kanban_board_members::table
                    .filter(kanban_board_members::user_id.eq(session.user_id))
                    .select(kanban_board_members::board_id),
            ),
        );
    }

    let boards = query.load(conn)?;
    attach_columns(conn, boards)
}

pub fn get_board(
    conn: &mut PgConnection,
    session: &SessionContext,
    id: i32,
) -> ServiceResult<BoardDetail> {
    ensure_board_access(conn, session, id)?;

    let board = find_board(conn, id)?.ok_or_else(|| board_not_found(id))?;
    let mut details = attach_columns(conn, vec![board])?;
    details.pop().ok_or_else(|| board_not_found(id))
}

#[instrument(skip(conn, changes))]
pub fn update_board(
    conn: &mut PgConnection,
    id: i32,
    changes: BoardChanges,
) -> ServiceResult<KanbanBoard> {
    let board = find_board(conn, id)?.ok_or_else(|| board_not_found(id))?;
    if changes.is_empty() {
        return Ok(board);
    }

    let board = diesel::update(kanban_boards::table.find(id))
        .set((&changes, kanban_boards::updated_at.eq(diesel::dsl::now)))
        .returning(KanbanBoard::as_returning())
        .get_result(conn)?;

    info!(board_id = id, "Kanban board updated");
    Ok(board)
}

/// Strict add: a second add of the same user is a conflict.
#[instrument(skip(conn))]
pub fn add_member(
    conn: &mut PgConnection,
    board_id: i32,
    user_id: i32,
    actor_id: i32,
) -> ServiceResult<KanbanBoardMember> {
    conn.transaction(|conn| {
        let board = find_board(conn, board_id)?
            .ok_or_else(|| ServiceError::not_found("Board not found"))?;

        let user_exists: bool = diesel::select(diesel::dsl::exists(
            users::table
                .find(user_id)
                .filter(users::is_deleted.eq(false)),
        ))
        .get_result(conn)?;
        if !user_exists {
            return Err(ServiceError::not_found(format!(
                "User with id {} not found",
                user_id
            )));
        }

        // The unique (board_id, user_id) constraint decides duplicates.
        let member = diesel::insert_into(kanban_board_members::table)
            .values(&NewKanbanBoardMember { board_id, user_id })
            .returning(KanbanBoardMember::as_returning())
            .get_result(conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    ServiceError::conflict("User is already a member of this board")
                }
                other => other.into(),
            })?;

        OutboxService::emit(
            conn,
            EventType::KanbanMemberAdded,
            AggregateType::Board,
            board_id,
            &BoardMembershipPayload { board_id, user_id },
            Some(actor_id),
        )?;
        OutboxService::notify(
            conn,
            user_id,
            "Added to board",
            format!("You were added to the board \"{}\"", board.name),
            Some(actor_id),
        )?;

        info!(board_id, user_id, "Board member added");
        Ok(member)
    })
}

#[instrument(skip(conn))]
pub fn remove_member(
    conn: &mut PgConnection,
    board_id: i32,
    user_id: i32,
    actor_id: i32,
) -> ServiceResult<()> {
    conn.transaction(|conn| {
        let removed = diesel::delete(
            kanban_board_members::table
                .filter(kanban_board_members::board_id.eq(board_id))
                .filter(kanban_board_members::user_id.eq(user_id)),
        )
        .execute(conn)?;

        if removed == 0 {
            return Err(ServiceError::not_found("Membership not found"));
        }

        OutboxService::emit(
            conn,
            EventType::KanbanMemberRemoved,
            AggregateType::Board,
            board_id,
            &BoardMembershipPayload { board_id, user_id },
            Some(actor_id),
        )?;

        info!(board_id, user_id, "Board member removed");
        Ok(())
    })
}

/// Members in the order they joined.
pub fn list_members(conn: &mut PgConnection, board_id: i32) -> ServiceResult<Vec<BoardMemberView>> {
    if find_board(conn, board_id)?.is_none() {
        return Err(ServiceError::not_found("Board not found"));
    }

    let rows: Vec<(i32, String, String, chrono::NaiveDateTime)> = kanban_board_members::table
        .inner_join(users::table)
        .filter(kanban_board_members::board_id.eq(board_id))
        .order((
            kanban_board_members::created_at.asc(),
            kanban_board_members::id.asc(),
        ))
        .select((
            users::id,
            users::email,
            users::full_name,
            kanban_board_members::created_at,
        ))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(user_id, email, full_name, joined_at)| BoardMemberView {
            user_id,
            email,
            full_name,
            joined_at,
        })
        .collect())
}

/// Forgiving self-service join: joining twice leaves one membership.
#[instrument(skip(conn, code))]
pub fn join_by_code(conn: &mut PgConnection, code: &str, user_id: i32) -> ServiceResult<BoardDetail> {
    let board = conn.transaction(|conn| {
        let board: KanbanBoard = kanban_boards::table
            .filter(kanban_boards::code.eq(code.trim()))
            .select(KanbanBoard::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ServiceError::not_found("Board not found"))?;

        let inserted = diesel::insert_into(kanban_board_members::table)
            .values(&NewKanbanBoardMember {
                board_id: board.id,
                user_id,
            })
            .on_conflict((kanban_board_members::board_id, kanban_board_members::user_id))
            .do_nothing()
            .execute(conn)?;

        if inserted > 0 {
            OutboxService::emit(
                conn,
                EventType::KanbanMemberJoined,
                AggregateType::Board,
                board.id,
                &BoardMembershipPayload {
                    board_id: board.id,
                    user_id,
                },
                Some(user_id),
            )?;
            info!(board_id = board.id, user_id, "User joined board by code");
        }

        Ok::<_, ServiceError>(board)
    })?;

    let board_id = board.id;
    attach_columns(conn, vec![board])?
        .pop()
        .ok_or_else(|| board_not_found(board_id))
}
