//! List envelopes returned by collection endpoints.
//!
//! The backend answers list requests with `{ items: [...], pagination: {...} }`
//! but is loose about it: either part may be missing, `items` may be `null`,
//! and pagination fields may be absent. [`Page::from_value`] turns whatever
//! arrived into a consistent shape.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

/// Pagination block of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// A normalized page of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl Page<Value> {
    /// Normalizes a raw list response.
    ///
    /// - `items` becomes `[]` unless it is an array.
    /// - `page`/`limit` default to 1/10, `total` to the number of items, and
    ///   `totalPages` to `ceil(total / limit)`, never less than 1.
    pub fn from_value(value: &Value) -> Self {
        let items = match value.get("items") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };

        let block = value.get("pagination").unwrap_or(&Value::Null);
        let field = |names: &[&str]| -> Option<u64> {
            names
                .iter()
                .find_map(|n| block.get(*n).and_then(as_u64_lenient))
        };

        // Values that do not fit a u32 fall back to the defaults
        let small = |names: &[&str]| field(names).and_then(|n| u32::try_from(n).ok());

        let page = small(&["page"]).filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
        let limit = small(&["limit", "pageSize"])
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIMIT);
        let total = field(&["total", "totalItems"]).unwrap_or(items.len() as u64);
        let total_pages = small(&["totalPages", "total_pages"])
            .unwrap_or_else(|| {
                u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX)
            })
            .max(1);

        Self {
            items,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages,
            },
        }
    }

    /// Deserializes every item into `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<Page<T>, ApiError> {
        let items = self
            .items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(Page {
            items,
            pagination: self.pagination,
        })
    }
}

/// Numbers sometimes arrive as strings ("3").
fn as_u64_lenient(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Query parameters for a list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub filters: BTreeMap<String, String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            search: None,
            filters: BTreeMap::new(),
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Sets the free-text search term. Blank terms are ignored.
    #[must_use]
    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        self.search = (!term.trim().is_empty()).then(|| term.trim().to_string());
        self
    }

    #[must_use]
    pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Serializes into `(name, value)` pairs for the query string.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), self.page.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ];
        if let Some(search) = &self.search {
            params.push(("search".to_string(), search.clone()));
        }
        params.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
        params
    }
}
