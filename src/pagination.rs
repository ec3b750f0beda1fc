//! Page-based pagination for list endpoints.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: i64 = 15;
pub const MAX_PER_PAGE: i64 = 100;

/// Requested page. Out-of-range values are clamped instead of rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(DEFAULT_PER_PAGE)
                .clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: i64,
    pub last_page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl PageMeta {
    pub fn new(request: PageRequest, total: i64) -> Self {
        let last_page = ((total + request.per_page - 1) / request.per_page).max(1);
        Self {
            current_page: request.page,
            last_page,
            per_page: request.per_page,
            total,
        }
    }
}

/// One page of results plus its meta block.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        assert_eq!(PageRequest::default(), PageRequest { page: 1, per_page: 15 });
        assert_eq!(PageRequest::new(Some(0), Some(500)).per_page, 100);
        assert_eq!(PageRequest::new(Some(-3), Some(0)), PageRequest { page: 1, per_page: 1 });
        assert_eq!(PageRequest::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn test_huge_page_offset_saturates() {
        let req = PageRequest::new(Some(i64::MAX), Some(100));
        assert_eq!(req.offset(), i64::MAX);
        let meta = PageMeta::new(req, 30);
        assert_eq!(meta.current_page, i64::MAX);
        assert_eq!(meta.last_page, 1);
    }

    #[test]
    fn test_last_page() {
        let req = PageRequest::new(None, Some(15));
        assert_eq!(PageMeta::new(req, 0).last_page, 1);
        assert_eq!(PageMeta::new(req, 15).last_page, 1);
        assert_eq!(PageMeta::new(req, 16).last_page, 2);
        assert_eq!(PageMeta::new(req, 46).last_page, 4);
    }
}
