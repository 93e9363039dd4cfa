//! Reference data handlers for regions, project statuses and project types.
//!
//! Reads are open to any authenticated caller; writes need
//! `dictionaries:manage`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{get_db_conn, parse_id, ApiError, ApiResult},
    handlers::validate_body,
    models::{ProjectStatus, ProjectType, Region},
    services::dictionaries,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DictionaryEntryRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    #[schema(example = "North-West")]
    pub name: String,
}

macro_rules! dictionary_handlers {
    (
        $service:ident, $model:ident, $base:tt, $item:tt, $tag:tt,
        $list:ident, $get:ident, $create:ident, $update:ident, $delete:ident
    ) => {
        #[utoipa::path(
            get,
            path = $base,
            tag = $tag,
            responses((status = 200, description = "Entries ordered by name", body = Vec<$model>)),
            security(("bearer_auth" = []))
        )]
        pub async fn $list(State(state): State<AppState>) -> ApiResult<Json<Vec<$model>>> {
            let mut conn = get_db_conn(&state.db_pool)?;
            Ok(Json(dictionaries::$service::list(&mut conn)?))
        }

        #[utoipa::path(
            get,
            path = $item,
            tag = $tag,
            params(("id" = i32, Path, description = "Entry ID")),
            responses(
                (status = 200, description = "Entry", body = $model),
                (status = 404, description = "Entry not found", body = ApiError)
            ),
            security(("bearer_auth" = []))
        )]
        pub async fn $get(
            State(state): State<AppState>,
            Path(id): Path<String>,
        ) -> ApiResult<Json<$model>> {
            let id = parse_id(&id, "id")?;
            let mut conn = get_db_conn(&state.db_pool)?;
            Ok(Json(dictionaries::$service::get(&mut conn, id)?))
        }

        #[utoipa::path(
            post,
            path = $base,
            tag = $tag,
            request_body = DictionaryEntryRequest,
            responses(
                (status = 201, description = "Entry created", body = $model),
                (status = 409, description = "Name already exists", body = ApiError)
            ),
            security(("bearer_auth" = []))
        )]
        pub async fn $create(
            State(state): State<AppState>,
            Json(payload): Json<DictionaryEntryRequest>,
        ) -> ApiResult<(StatusCode, Json<$model>)> {
            validate_body(&payload)?;
            let mut conn = get_db_conn(&state.db_pool)?;
            let entry = dictionaries::$service::create(&mut conn, &payload.name)?;
            Ok((StatusCode::CREATED, Json(entry)))
        }

        #[utoipa::path(
            patch,
            path = $item,
            tag = $tag,
            params(("id" = i32, Path, description = "Entry ID")),
            request_body = DictionaryEntryRequest,
            responses(
                (status = 200, description = "Entry renamed", body = $model),
                (status = 404, description = "Entry not found", body = ApiError),
                (status = 409, description = "Name already exists", body = ApiError)
            ),
            security(("bearer_auth" = []))
        )]
        pub async fn $update(
            State(state): State<AppState>,
            Path(id): Path<String>,
            Json(payload): Json<DictionaryEntryRequest>,
        ) -> ApiResult<Json<$model>> {
            let id = parse_id(&id, "id")?;
            validate_body(&payload)?;
            let mut conn = get_db_conn(&state.db_pool)?;
            Ok(Json(dictionaries::$service::rename(
                &mut conn,
                id,
                &payload.name,
            )?))
        }

        #[utoipa::path(
            delete,
            path = $item,
            tag = $tag,
            params(("id" = i32, Path, description = "Entry ID")),
            responses(
                (status = 204, description = "Entry deleted"),
                (status = 404, description = "Entry not found", body = ApiError),
                (status = 409, description = "Entry is used by projects", body = ApiError)
            ),
            security(("bearer_auth" = []))
        )]
        pub async fn $delete(
            State(state): State<AppState>,
            Path(id): Path<String>,
        ) -> ApiResult<StatusCode> {
            let id = parse_id(&id, "id")?;
            let mut conn = get_db_conn(&state.db_pool)?;
            dictionaries::$service::delete(&mut conn, id)?;
            Ok(StatusCode::NO_CONTENT)
        }
    };
}

dictionary_handlers!(
    regions,
    Region,
    "/regions",
    "/regions/{id}",
    "Dictionaries",
    list_regions,
    get_region,
    create_region,
    update_region,
    delete_region
);
dictionary_handlers!(
    statuses,
    ProjectStatus,
    "/project-statuses",
    "/project-statuses/{id}",
    "Dictionaries",
    list_statuses,
    get_status,
    create_status,
    update_status,
    delete_status
);
dictionary_handlers!(
    types,
    ProjectType,
    "/project-types",
    "/project-types/{id}",
    "Dictionaries",
    list_types,
    get_type,
    create_type,
    update_type,
    delete_type
);
