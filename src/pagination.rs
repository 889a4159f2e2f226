//! Limit/offset pagination for list endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;
pub const MIN_LIMIT: i64 = 1;

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// Maximum number of items to return. Defaults to 20, max 100.
    #[param(minimum = 1, maximum = 100, default = 20)]
    #[serde(default = "default_limit")]
    pub limit: i64,

    /// Number of items to skip. Defaults to 0.
    #[param(minimum = 0, default = 0)]
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PaginationParams {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }

    pub fn limit(&self) -> i64 {
        self.limit.clamp(MIN_LIMIT, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.max(0)
    }

    pub fn into_metadata(self, total_count: i64) -> PaginationMeta {
        PaginationMeta::new(self.limit(), self.offset(), total_count)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginationMeta {
    pub limit: i64,
    pub offset: i64,
    pub total_count: i64,
    pub has_more: bool,
}

impl PaginationMeta {
    pub fn new(limit: i64, offset: i64, total_count: i64) -> Self {
        Self {
            limit,
            offset,
            total_count,
            has_more: offset + limit < total_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn from_params(data: Vec<T>, params: PaginationParams, total_count: i64) -> Self {
        Self {
            data,
            pagination: params.into_metadata(total_count),
        }
    }
}
