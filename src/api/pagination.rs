//! Page-number pagination shared by every list endpoint.

use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw `page` and `page_size` query parameters, validated by [`PageParams::resolve`].
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageParams {
    pub fn resolve(&self) -> ApiResult<PageRequest> {
        let page = match self.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(|| ApiError::validation(format!("invalid page: {:?}", raw)))?,
        };
        let size = match self.page_size.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_PAGE_SIZE,
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|s| *s >= 1)
                .ok_or_else(|| ApiError::validation(format!("invalid page_size: {:?}", raw)))?
                .min(MAX_PAGE_SIZE),
        };
        Ok(PageRequest { page, size })
    }
}

impl PageRequest {
    pub fn limit(&self) -> i64 {
        self.size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.size)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Wrap one page of `results` out of `count` total items. Pages past the
    /// end are a 404; the first page of an empty listing is not.
    pub fn new(req: PageRequest, count: i64, results: Vec<T>) -> ApiResult<Self> {
        let last_page = ((count + req.size - 1) / req.size).max(1);
        if req.page > last_page {
            return Err(ApiError::NotFound("invalid page".to_string()));
        }
        Ok(Page {
            count,
            next: (req.page < last_page).then_some(req.page + 1),
            previous: (req.page > 1).then_some(req.page - 1),
            results,
        })
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}
