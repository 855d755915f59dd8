use axum::http::Uri;
use serde::Deserialize;

use courier_types::api::Page;

use crate::error::ApiError;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// `?page=&page_size=`, extracted alongside a handler's own filter query.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u32,
}

impl PageRequest {
    pub fn from_query(q: &PageQuery) -> Result<Self, ApiError> {
        let page = q.page.unwrap_or(1);
        if page == 0 {
            return Err(invalid_page());
        }
        let page_size = match q.page_size {
            Some(0) | None => DEFAULT_PAGE_SIZE,
            Some(n) => n.min(MAX_PAGE_SIZE),
        };
        Ok(Self { page, page_size })
    }

    pub fn limit(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(u64::from(self.page_size))
    }

    /// Wrap one page of results. Page 1 is always valid, other pages must
    /// fall inside `count`.
    pub fn into_page<T>(self, uri: &Uri, count: u64, results: Vec<T>) -> Result<Page<T>, ApiError> {
        let size = u64::from(self.page_size);
        let pages = count.div_ceil(size).max(1);
        if self.page > pages {
            return Err(invalid_page());
        }

        let link = |page: u64| page_link(uri, page);
        Ok(Page {
            count,
            next: (self.page < pages).then(|| link(self.page + 1)),
            previous: (self.page > 1).then(|| link(self.page - 1)),
            results,
        })
    }
}

fn invalid_page() -> ApiError {
    ApiError::not_found("Invalid page.")
}

/// The request URI with `page` replaced.
fn page_link(uri: &Uri, page: u64) -> String {
    let mut params: Vec<String> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|p| !p.is_empty() && !p.starts_with("page="))
        .map(str::to_string)
        .collect();
    params.push(format!("page={page}"));
    format!("{}?{}", uri.path(), params.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(page: Option<u64>, page_size: Option<u32>) -> Result<PageRequest, ApiError> {
        PageRequest::from_query(&PageQuery { page, page_size })
    }

    #[test]
    fn defaults_and_cap() {
        assert_eq!(req(None, None).unwrap(), PageRequest { page: 1, page_size: 20 });
        assert_eq!(req(Some(3), Some(500)).unwrap().page_size, MAX_PAGE_SIZE);
        assert_eq!(req(Some(3), Some(10)).unwrap().offset(), 20);
        assert!(matches!(req(Some(0), None), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn links_keep_other_params() {
        let uri: Uri = "/api/messages/?search=hi&page=2&page_size=10".parse().unwrap();
        let page = req(Some(2), Some(10)).unwrap().into_page(&uri, 25, vec![1, 2]).unwrap();
        assert_eq!(page.next.as_deref(), Some("/api/messages/?search=hi&page_size=10&page=3"));
        assert_eq!(page.previous.as_deref(), Some("/api/messages/?search=hi&page_size=10&page=1"));
    }

    #[test]
    fn boundaries() {
        let uri: Uri = "/api/messages/".parse().unwrap();

        let empty = req(None, None).unwrap().into_page::<i32>(&uri, 0, vec![]).unwrap();
        assert_eq!(empty.count, 0);
        assert!(empty.next.is_none() && empty.previous.is_none());

        let last = req(Some(3), Some(10)).unwrap().into_page(&uri, 25, vec![0; 5]).unwrap();
        assert!(last.next.is_none());

        assert!(req(Some(4), Some(10)).unwrap().into_page(&uri, 25, vec![0]).is_err());
    }
}
