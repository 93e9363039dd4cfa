//! Permission names referenced by route guards. The initial migration seeds
//! the same names.

pub const KANBAN_BOARDS_CREATE: &str = "kanban-boards:create";
pub const KANBAN_BOARDS_UPDATE: &str = "kanban-boards:update";
pub const KANBAN_BOARDS_MEMBERS_ADD: &str = "kanban-boards:members:add";
pub const KANBAN_BOARDS_MEMBERS_REMOVE: &str = "kanban-boards:members:remove";
pub const KANBAN_BOARDS_MEMBERS_LIST: &str = "kanban-boards:members:list";

pub const KANBAN_COLUMNS_CREATE: &str = "kanban-columns:create";
pub const KANBAN_COLUMNS_UPDATE: &str = "kanban-columns:update";
pub const KANBAN_COLUMNS_REORDER: &str = "kanban-columns:reorder";
pub const KANBAN_COLUMNS_DELETE: &str = "kanban-columns:delete";

pub const PROJECTS_CREATE: &str = "projects:create";
pub const PROJECTS_READ: &str = "projects:read";
pub const PROJECTS_UPDATE: &str = "projects:update";
pub const PROJECTS_DELETE: &str = "projects:delete";
pub const PROJECTS_UPDATE_STATUS: &str = "projects:update-status";
pub const PROJECTS_MOVE: &str = "projects:move";

pub const COMPANY_PROJECTS_LIST: &str = "company-projects:list";
pub const COMPANY_PROJECTS_CREATE: &str = "company-projects:create";
pub const COMPANY_USERS_LIST: &str = "company-users:list";
pub const COMPANY_USERS_READ: &str = "company-users:read";
pub const COMPANY_USERS_INVITE: &str = "company-users:invite";
pub const COMPANY_USERS_DEACTIVATE: &str = "company-users:deactivate";

pub const COMPANIES_MANAGE: &str = "companies:manage";
pub const ROLES_MANAGE: &str = "roles:manage";
pub const PERMISSIONS_MANAGE: &str = "permissions:manage";
pub const USERS_MANAGE: &str = "users:manage";
pub const DICTIONARIES_MANAGE: &str = "dictionaries:manage";

pub const ALL: &[&str] = &[
    KANBAN_BOARDS_CREATE,
    KANBAN_BOARDS_UPDATE,
    KANBAN_BOARDS_MEMBERS_ADD,
    KANBAN_BOARDS_MEMBERS_REMOVE,
    KANBAN_BOARDS_MEMBERS_LIST,
    KANBAN_COLUMNS_CREATE,
    KANBAN_COLUMNS_UPDATE,
    KANBAN_COLUMNS_REORDER,
    KANBAN_COLUMNS_DELETE,
    PROJECTS_CREATE,
    PROJECTS_READ,
    PROJECTS_UPDATE,
    PROJECTS_DELETE,
    PROJECTS_UPDATE_STATUS,
    PROJECTS_MOVE,
    COMPANY_PROJECTS_LIST,
    COMPANY_PROJECTS_CREATE,
    COMPANY_USERS_LIST,
    COMPANY_USERS_READ,
    COMPANY_USERS_INVITE,
    COMPANY_USERS_DEACTIVATE,
    COMPANIES_MANAGE,
    ROLES_MANAGE,
    PERMISSIONS_MANAGE,
    USERS_MANAGE,
    DICTIONARIES_MANAGE,
];

pub const COMPANY_ADMIN_ROLE: &str = "COMPANY_ADMIN";
pub const COMPANY_USER_ROLE: &str = "COMPANY_USER";
