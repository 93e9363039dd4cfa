//! Page/per-page query parameters and the envelope returned by list endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// Page number, starting at 1.
    #[param(minimum = 1, default = 1)]
    #[serde(default = "default_page")]
    pub page: i64,

    /// Items per page, capped at 100.
    #[param(minimum = 1, maximum = 100, default = 20)]
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    DEFAULT_PER_PAGE
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self::new(default_page(), DEFAULT_PER_PAGE)
    }
}

impl PaginationParams {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self { page, per_page }
    }

    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// `(LIMIT, OFFSET)` for the clamped page.
    pub fn limit_offset(&self) -> (i64, i64) {
        let per_page = self.per_page();
        (per_page, (self.page() - 1) * per_page)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginationMeta {
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: i64, per_page: i64, total_count: i64) -> Self {
        let total_pages = ((total_count + per_page - 1) / per_page).max(1);
        Self {
            page,
            per_page,
            total_count,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn from_params(data: Vec<T>, params: &PaginationParams, total_count: i64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(params.page(), params.per_page(), total_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = PaginationParams::default();
        assert_eq!(params.page(), 1);
        assert_eq!(params.per_page(), DEFAULT_PER_PAGE);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        assert_eq!(PaginationParams::new(0, 20).page(), 1);
        assert_eq!(PaginationParams::new(-5, 20).page(), 1);
        assert_eq!(PaginationParams::new(1, 500).per_page(), MAX_PER_PAGE);
        assert_eq!(PaginationParams::new(1, 0).per_page(), 1);
    }

    #[test]
    fn test_limit_offset() {
        assert_eq!(PaginationParams::new(1, 20).limit_offset(), (20, 0));
        assert_eq!(PaginationParams::new(3, 10).limit_offset(), (10, 20));
        assert_eq!(PaginationParams::new(2, 1000).limit_offset(), (100, 100));
    }

    #[test]
    fn test_meta_page_counts() {
        let meta = PaginationMeta::new(1, 20, 100);
        assert_eq!(meta.total_pages, 5);
        assert!(meta.has_next);
        assert!(!meta.has_prev);

        let meta = PaginationMeta::new(5, 20, 95);
        assert_eq!(meta.total_pages, 5);
        assert!(!meta.has_next);

        let meta = PaginationMeta::new(1, 20, 0);
        assert_eq!(meta.total_pages, 1);
        assert!(!meta.has_next);
        assert!(!meta.has_prev);
    }

    #[test]
    fn test_paginated_response_uses_clamped_params() {
        let params = PaginationParams::new(0, 10);
        let response = PaginatedResponse::from_params(vec!["a", "b", "c"], &params, 25);
        assert_eq!(response.pagination.page, 1);
        assert_eq!(response.pagination.total_pages, 3);
        assert!(response.pagination.has_next);
    }
}
