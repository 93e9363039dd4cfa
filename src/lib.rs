//! Boardroom - multi-tenant project management backend with role-based
//! authorization, company scoping and kanban boards.

pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod schema;
pub mod services;
pub mod telemetry;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put, MethodRouter},
    Json, Router,
};

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use auth::jwt::{JwtKeyError, JwtKeys};
use auth::password::{PasswordPolicy, PasswordService};
use authz::{catalog::*, Guard};
use error::ServiceError;
use handlers::{auth as auth_h, boards, columns, companies, dictionaries, health, projects};
use middleware::{
    guard_middleware, metrics::metrics_middleware,
    rate_limit::{auth_rate_limit_middleware, rate_limit_middleware, RateLimitState},
    request_id::request_id_middleware,
};
use telemetry::MetricsState;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Failures that stop the service before it starts accepting requests.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("database pool: {0}")]
    Pool(#[from] r2d2::PoolError),
    #[error("migrations: {0}")]
    Migrations(String),
    #[error("signing keys: {0}")]
    Keys(#[from] JwtKeyError),
    #[error("admin bootstrap: {0}")]
    Bootstrap(#[from] ServiceError),
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub jwt: Arc<JwtKeys>,
    pub rate_limit: RateLimitState,
    pub password_policy: PasswordPolicy,
    pub password_hash_cost: u32,
    pub secure_cookies: bool,
    pub metrics: MetricsState,
    pub redis_pool: Option<deadpool_redis::Pool>,
}

impl AppState {
    /// Builds the state with signing keys read from the environment.
    pub fn new(
        db_pool: DbPool,
        redis_pool: Option<deadpool_redis::Pool>,
        config: &Config,
    ) -> Result<Self, JwtKeyError> {
        let keys = JwtKeys::from_env(&config.jwt)?;
        Ok(Self::with_keys(db_pool, redis_pool, config, keys))
    }

    pub fn with_keys(
        db_pool: DbPool,
        redis_pool: Option<deadpool_redis::Pool>,
        config: &Config,
        keys: JwtKeys,
    ) -> Self {
        Self {
            db_pool,
            jwt: Arc::new(keys),
            rate_limit: RateLimitState::from_config(&config.security),
            password_policy: PasswordPolicy::from_config(&config.security),
            password_hash_cost: config.security.password_hash_cost,
            secure_cookies: config.security.secure_cookies,
            metrics: MetricsState::new(config.telemetry.metrics_enabled),
            redis_pool,
        }
    }
}

/// Attaches the authentication and authorization guard to a route.
fn guarded(route: MethodRouter<AppState>, state: &AppState, guard: Guard) -> MethodRouter<AppState> {
    route.route_layer(axum_middleware::from_fn_with_state(
        (state.clone(), guard),
        guard_middleware,
    ))
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let s = &state;
    let authenticated = Guard::authenticated();
    let perms = Guard::permissions;
    let company = |required: &'static [&'static str]| Guard::company(required, "id");

    let public_routes = Router::new()
        .route("/health", get(health::health_check_simple))
        .route("/health/status", get(health::health_check))
        .route("/health/ready", get(health::ready_check))
        .route("/health/live", get(health::live_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(state.metrics.clone()),
        );

    let auth_routes = Router::new()
        .route("/auth/login", post(auth_h::login))
        .route("/auth/refresh", post(auth_h::refresh_token))
        .route("/auth/register", post(auth_h::register))
        .layer(axum_middleware::from_fn_with_state(
            state.rate_limit.clone(),
            auth_rate_limit_middleware,
        ));

    let session_routes = Router::new()
        .route("/auth/logout", guarded(post(auth_h::logout), s, authenticated))
        .route("/auth/me", guarded(get(auth_h::me), s, authenticated))
        .route(
            "/auth/permissions",
            guarded(get(auth_h::permissions), s, authenticated),
        );

    let board_routes = Router::new()
        .route(
            "/kanban-boards",
            guarded(get(boards::list_boards), s, authenticated),
        )
        .route(
            "/kanban-boards",
            guarded(post(boards::create_board), s, perms(&[KANBAN_BOARDS_CREATE])),
        )
        .route(
            "/kanban-boards/join",
            guarded(post(boards::join_board), s, authenticated),
        )
        .route(
            "/kanban-boards/{id}",
            guarded(get(boards::get_board), s, authenticated),
        )
        .route(
            "/kanban-boards/{id}",
            guarded(patch(boards::update_board), s, perms(&[KANBAN_BOARDS_UPDATE])),
        )
        .route(
            "/kanban-boards/{id}/members",
            guarded(post(boards::add_member), s, perms(&[KANBAN_BOARDS_MEMBERS_ADD])),
        )
        .route(
            "/kanban-boards/{id}/members",
            guarded(get(boards::list_members), s, perms(&[KANBAN_BOARDS_MEMBERS_LIST])),
        )
        .route(
            "/kanban-boards/{id}/members/{user_id}",
            guarded(
                delete(boards::remove_member),
                s,
                perms(&[KANBAN_BOARDS_MEMBERS_REMOVE]),
            ),
        )
        .route(
            "/kanban-columns",
            guarded(post(columns::create_column), s, perms(&[KANBAN_COLUMNS_CREATE])),
        )
        .route(
            "/kanban-columns/reorder",
            guarded(
                patch(columns::reorder_columns),
                s,
                perms(&[KANBAN_COLUMNS_REORDER]),
            ),
        )
        .route(
            "/kanban-columns/board/{board_id}",
            guarded(get(columns::list_board_columns), s, authenticated),
        )
        .route(
            "/kanban-columns/{id}",
            guarded(patch(columns::update_column), s, perms(&[KANBAN_COLUMNS_UPDATE])),
        )
        .route(
            "/kanban-columns/{id}",
            guarded(delete(columns::delete_column), s, perms(&[KANBAN_COLUMNS_DELETE])),
        );

    let project_routes = Router::new()
        .route(
            "/projects",
            guarded(post(projects::create_project), s, perms(&[PROJECTS_CREATE])),
        )
        .route(
            "/projects",
            guarded(get(projects::list_projects), s, perms(&[PROJECTS_READ])),
        )
        .route(
            "/projects/check-name",
            guarded(get(projects::check_name), s, perms(&[PROJECTS_READ])),
        )
        .route(
            "/projects/{id}",
            guarded(get(projects::get_project), s, perms(&[PROJECTS_READ])),
        )
        .route(
            "/projects/{id}",
            guarded(put(projects::update_project), s, perms(&[PROJECTS_UPDATE])),
        )
        .route(
            "/projects/{id}",
            guarded(delete(projects::delete_project), s, perms(&[PROJECTS_DELETE])),
        )
        .route(
            "/projects/{id}/status",
            guarded(
                patch(projects::update_status),
                s,
                perms(&[PROJECTS_UPDATE_STATUS]),
            ),
        )
        .route(
            "/projects/{id}/move-to-kanban/{column_id}",
            guarded(patch(projects::move_to_column), s, perms(&[PROJECTS_MOVE])),
        )
        .route(
            "/projects/{id}/logs",
            guarded(get(projects::list_logs), s, perms(&[PROJECTS_READ])),
        )
        .route(
            "/projects/{id}/comments",
            guarded(get(projects::list_comments), s, perms(&[PROJECTS_READ])),
        )
        .route(
            "/projects/{id}/comments",
            guarded(post(projects::add_comment), s, perms(&[PROJECTS_READ])),
        );

    let manage_companies = perms(&[COMPANIES_MANAGE]);
    let company_routes = Router::new()
        .route(
            "/companies",
            guarded(post(companies::create_company), s, manage_companies),
        )
        .route(
            "/companies",
            guarded(get(companies::list_companies), s, manage_companies),
        )
        .route(
            "/companies/{id}",
            guarded(get(companies::get_company), s, manage_companies),
        )
        .route(
            "/companies/{id}",
            guarded(patch(companies::update_company), s, manage_companies),
        )
        .route(
            "/companies/{id}",
            guarded(delete(companies::delete_company), s, manage_companies),
        )
        .route(
            "/companies/{id}/users",
            guarded(
                get(companies::list_company_users),
                s,
                company(&[COMPANY_USERS_LIST]),
            ),
        )
        .route(
            "/companies/{id}/users",
            guarded(
                post(companies::create_company_user),
                s,
                company(&[COMPANY_USERS_INVITE]),
            ),
        )
        .route(
            "/companies/{id}/users/add-existing",
            guarded(
                post(companies::add_existing_user),
                s,
                company(&[COMPANY_USERS_INVITE]),
            ),
        )
        .route(
            "/companies/{id}/users/{user_id}",
            guarded(
                get(companies::get_company_user),
                s,
                company(&[COMPANY_USERS_READ]),
            ),
        )
        .route(
            "/companies/{id}/users/{user_id}",
            guarded(
                patch(companies::update_company_user),
                s,
                company(&[COMPANY_USERS_INVITE]),
            ),
        )
        .route(
            "/companies/{id}/users/{user_id}",
            guarded(
                delete(companies::remove_company_user),
                s,
                company(&[COMPANY_USERS_DEACTIVATE]),
            ),
        )
        .route(
            "/companies/{id}/users/{user_id}/deactivate",
            guarded(
                post(companies::deactivate_company_user),
                s,
                company(&[COMPANY_USERS_DEACTIVATE]),
            ),
        )
        .route(
            "/companies/{id}/users/{user_id}/activate",
            guarded(
                post(companies::activate_company_user),
                s,
                company(&[COMPANY_USERS_DEACTIVATE]),
            ),
        )
        .route(
            "/companies/{id}/users/{user_id}/roles",
            guarded(
                post(companies::assign_company_role),
                s,
                company(&[COMPANY_USERS_INVITE]),
            ),
        )
        .route(
            "/companies/{id}/users/{user_id}/roles/{role_id}",
            guarded(
                delete(companies::remove_company_role),
                s,
                company(&[COMPANY_USERS_INVITE]),
            ),
        )
        .route(
            "/companies/{id}/invitations",
            guarded(
                post(companies::create_invitation),
                s,
                company(&[COMPANY_USERS_INVITE]),
            ),
        )
        .route(
            "/companies/{id}/invitations",
            guarded(
                get(companies::list_invitations),
                s,
                company(&[COMPANY_USERS_INVITE]),
            ),
        )
        .route(
            "/companies/{id}/projects",
            guarded(
                get(companies::list_company_projects),
                s,
                company(&[COMPANY_PROJECTS_LIST]),
            ),
        )
        .route(
            "/companies/{id}/projects",
            guarded(
                post(companies::create_company_project),
                s,
                company(&[COMPANY_PROJECTS_CREATE]),
            ),
        );

    let roles_guard = perms(&[ROLES_MANAGE]);
    let permissions_guard = perms(&[PERMISSIONS_MANAGE]);
    let users_guard = perms(&[USERS_MANAGE]);
    let admin_routes = Router::new()
        .route("/roles", guarded(post(handlers::roles::create_role), s, roles_guard))
        .route("/roles", guarded(get(handlers::roles::list_roles), s, roles_guard))
        .route("/roles/{id}", guarded(get(handlers::roles::get_role), s, roles_guard))
        .route(
            "/roles/{id}",
            guarded(patch(handlers::roles::update_role), s, roles_guard),
        )
        .route(
            "/roles/{id}",
            guarded(delete(handlers::roles::delete_role), s, roles_guard),
        )
        .route(
            "/permissions",
            guarded(
                post(handlers::permissions::create_permission),
                s,
                permissions_guard,
            ),
        )
        .route(
            "/permissions",
            guarded(
                get(handlers::permissions::list_permissions),
                s,
                permissions_guard,
            ),
        )
        .route(
            "/permissions/{id}",
            guarded(
                get(handlers::permissions::get_permission),
                s,
                permissions_guard,
            ),
        )
        .route(
            "/permissions/{id}",
            guarded(
                patch(handlers::permissions::update_permission),
                s,
                permissions_guard,
            ),
        )
        .route(
            "/permissions/{id}",
            guarded(
                delete(handlers::permissions::delete_permission),
                s,
                permissions_guard,
            ),
        )
        .route("/users", guarded(post(handlers::users::create_user), s, users_guard))
        .route("/users", guarded(get(handlers::users::list_users), s, users_guard))
        .route("/users/{id}", guarded(get(handlers::users::get_user), s, users_guard))
        .route(
            "/users/{id}",
            guarded(patch(handlers::users::update_user), s, users_guard),
        )
        .route(
            "/users/{id}",
            guarded(delete(handlers::users::delete_user), s, users_guard),
        )
        .route(
            "/users/{id}/roles",
            guarded(post(handlers::users::assign_role), s, users_guard),
        )
        .route(
            "/users/{id}/roles/{role_id}",
            guarded(delete(handlers::users::remove_role), s, users_guard),
        );

    let dictionaries_guard = perms(&[DICTIONARIES_MANAGE]);
    let mut dictionary_routes = Router::new();
    for (base, item, list, get_one, create, update, remove) in [
        (
            "/regions",
            "/regions/{id}",
            get(dictionaries::list_regions),
            get(dictionaries::get_region),
            post(dictionaries::create_region),
            patch(dictionaries::update_region),
            delete(dictionaries::delete_region),
        ),
        (
            "/project-statuses",
            "/project-statuses/{id}",
            get(dictionaries::list_statuses),
            get(dictionaries::get_status),
            post(dictionaries::create_status),
            patch(dictionaries::update_status),
            delete(dictionaries::delete_status),
        ),
        (
            "/project-types",
            "/project-types/{id}",
            get(dictionaries::list_types),
            get(dictionaries::get_type),
            post(dictionaries::create_type),
            patch(dictionaries::update_type),
            delete(dictionaries::delete_type),
        ),
    ] {
        dictionary_routes = dictionary_routes
            .route(base, guarded(list, s, authenticated))
            .route(base, guarded(create, s, dictionaries_guard))
            .route(item, guarded(get_one, s, authenticated))
            .route(item, guarded(update, s, dictionaries_guard))
            .route(item, guarded(remove, s, dictionaries_guard));
    }

    let api_routes = Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(session_routes)
        .merge(board_routes)
        .merge(project_routes)
        .merge(company_routes)
        .merge(admin_routes)
        .merge(dictionary_routes)
        .with_state(state.clone());

    Router::new()
        .merge(openapi::swagger_router())
        .merge(api_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(error::ApiError::new("Not found", "NOT_FOUND")),
    )
}

fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::Method;

    let is_wildcard_origin = config.cors.allowed_origins.contains(&"*".to_string())
        || config.cors.allowed_origins.is_empty();

    let methods: Vec<Method> = config
        .cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let origins = || -> Vec<_> {
        config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect()
    };

    let cors = match (config.cors.allow_credentials, is_wildcard_origin) {
        // Credentialed requests cannot use `*`, so the request origin is echoed.
        (true, true) => {
            CorsLayer::new().allow_origin(tower_http::cors::AllowOrigin::mirror_request())
        }
        (true, false) | (false, false) => CorsLayer::new().allow_origin(origins()),
        (false, true) => CorsLayer::new().allow_origin(Any),
    };

    cors.allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(config.cors.allow_credentials)
        .max_age(Duration::from_secs(config.cors.max_age_secs))
}

pub fn create_db_pool(config: &config::Config) -> Result<DbPool, r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(&config.database.url);
    r2d2::Pool::builder()
        .max_size(config.database.max_connections)
        .min_idle(Some(config.database.min_connections))
        .connection_timeout(Duration::from_secs(config.database.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.database.idle_timeout_secs)))
        .build(manager)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), StartupError> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StartupError::Migrations(e.to_string()))?;
    info!(count = applied.len(), "Migrations applied");
    Ok(())
}

/// Creates the configured system administrator if the email is not taken yet.
pub fn bootstrap_admin(pool: &DbPool, config: &Config) -> Result<Option<i32>, StartupError> {
    let Some((email, password)) = config.bootstrap.admin_credentials() else {
        return Ok(None);
    };

    let mut conn = pool.get()?;
    let created = services::users::ensure_admin(
        &mut conn,
        email,
        &config.bootstrap.admin_full_name,
        || PasswordService::hash(password, config.security.password_hash_cost),
    )?;
    if let Some(id) = created {
        info!(user_id = id, "Bootstrap administrator created");
    }
    Ok(created)
}

pub fn init_tracing(config: &config::Config) {
    telemetry::init_telemetry(config);
}

pub use telemetry::tracing::shutdown_telemetry;

pub use config::Config;
