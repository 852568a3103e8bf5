//! Page envelopes and pagination bookkeeping.
//!
//! Paginated endpoints answer with an envelope carrying the items under
//! `content` plus `number`, `size`, `totalElements` and `totalPages`. Any of
//! the metadata fields may be missing, and some endpoints answer with a bare
//! array. Decoding always yields a `Pagination` that satisfies
//! `total_pages == ceil(total_elements / size)` and
//! `page < max(total_pages, 1)`.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Caller-supplied page request. Unset fields fall back to the current
/// pagination state of the controller issuing the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl PageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Resolve into concrete parameters. `self` wins over `base_filters`,
    /// and an unset page or size falls back to `current`.
    pub fn resolve(&self, base_filters: &BTreeMap<String, String>, current: &Pagination) -> PageParams {
        let mut filters = base_filters.clone();
        filters.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
        PageParams {
            page: self.page.unwrap_or(current.page),
            size: self.size.filter(|size| *size > 0).unwrap_or(current.size),
            filters,
        }
    }
}

/// Fully resolved parameters handed to a page-fetching operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParams {
    pub page: u32,
    pub size: u32,
    pub filters: BTreeMap<String, String>,
}

impl PageParams {
    pub fn first(size: u32) -> Self {
        Self {
            page: 0,
            size,
            filters: BTreeMap::new(),
        }
    }

    /// Query-string pairs: filters first, then `page` and `size`.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = self
            .filters
            .iter()
            .filter(|(key, _)| key.as_str() != "page" && key.as_str() != "size")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        query.push(("page".to_string(), self.page.to_string()));
        query.push(("size".to_string(), self.size.to_string()));
        query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            total_elements: 0,
            total_pages: 0,
        }
    }
}

impl Pagination {
    /// Build from raw envelope fields, defaulting what is absent and
    /// recomputing `total_pages` from `total_elements` and `size`.
    pub fn from_envelope(
        number: Option<u32>,
        size: Option<u32>,
        total_elements: Option<u64>,
        reported_pages: Option<u32>,
    ) -> Self {
        let size = size.filter(|size| *size > 0).unwrap_or(DEFAULT_PAGE_SIZE);
        let total_elements = total_elements.unwrap_or(0);
        let total_pages = pages_for(total_elements, size);
        if let Some(reported) = reported_pages {
            if reported != total_pages {
                tracing::debug!(
                    reported,
                    computed = total_pages,
                    "envelope totalPages disagrees with totalElements/size"
                );
            }
        }
        Self {
            page: number.unwrap_or(0).min(total_pages.saturating_sub(1)),
            size,
            total_elements,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages.saturating_sub(1)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 0
    }

    /// Whether `page` lies in `[0, total_pages)`.
    pub fn contains(&self, page: u32) -> bool {
        page < self.total_pages
    }

    pub fn is_consistent(&self) -> bool {
        self.size > 0
            && self.total_pages == pages_for(self.total_elements, self.size)
            && self.page < self.total_pages.max(1)
    }
}

fn pages_for(total_elements: u64, size: u32) -> u32 {
    if size == 0 {
        return 0;
    }
    u32::try_from(total_elements.div_ceil(u64::from(size))).unwrap_or(u32::MAX)
}

/// One page of items with its normalized metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagedEnvelope<T> {
    content: Vec<T>,
    #[serde(default)]
    number: Option<u32>,
    #[serde(default)]
    size: Option<u32>,
    #[serde(default)]
    total_elements: Option<u64>,
    #[serde(default)]
    total_pages: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Paged(PagedEnvelope<T>),
    Bare(Vec<T>),
}

/// Decode a paginated response body.
pub fn decode_page<T: DeserializeOwned>(body: &[u8]) -> Result<Page<T>, serde_json::Error> {
    let page = match serde_json::from_slice::<Envelope<T>>(body)? {
        Envelope::Paged(envelope) => Page {
            pagination: Pagination::from_envelope(
                envelope.number,
                envelope.size,
                envelope.total_elements,
                envelope.total_pages,
            ),
            items: envelope.content,
        },
        Envelope::Bare(items) => Page {
            items,
            pagination: Pagination::default(),
        },
    };
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn envelope_is_unwrapped_from_content() {
        let body = br#"{"content":[1,2,3],"number":0,"size":12,"totalElements":30,"totalPages":3}"#;
        let page: Page<u32> = decode_page(body).unwrap();
        assert_eq!(page.items, vec![1, 2, 3]);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.size, 12);
        assert!(page.pagination.has_next());
        assert!(!page.pagination.has_prev());
    }

    #[test]
    fn missing_fields_default() {
        let page: Page<u32> = decode_page(br#"{"content":[]}"#).unwrap();
        assert_eq!(page.pagination, Pagination::default());
    }

    #[test]
    fn bare_array_is_accepted() {
        let page: Page<String> = decode_page(br#"["a","b"]"#).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pagination.total_pages, 0);
    }

    #[test]
    fn zero_size_falls_back_to_default() {
        let p = Pagination::from_envelope(Some(0), Some(0), Some(25), None);
        assert_eq!(p.size, DEFAULT_PAGE_SIZE);
        assert_eq!(p.total_pages, 3);
    }

    #[test]
    fn out_of_range_page_is_clamped() {
        let p = Pagination::from_envelope(Some(9), Some(10), Some(15), Some(2));
        assert_eq!(p.page, 1);
        assert!(p.is_consistent());
    }

    #[test]
    fn undecodable_body_is_an_error() {
        assert!(decode_page::<u32>(b"not json").is_err());
    }

    #[rstest]
    #[case(0, 10, 0)]
    #[case(1, 10, 1)]
    #[case(10, 10, 1)]
    #[case(11, 10, 2)]
    #[case(30, 12, 3)]
    #[case(99, 1, 99)]
    fn total_pages_is_ceiling(#[case] total: u64, #[case] size: u32, #[case] expected: u32) {
        let p = Pagination::from_envelope(None, Some(size), Some(total), None);
        assert_eq!(p.total_pages, expected);
        assert!(p.is_consistent());
    }

    #[test]
    fn resolve_merges_over_current_and_base() {
        let base: BTreeMap<String, String> =
            [("status".to_string(), "OPEN".to_string()), ("q".to_string(), "logo".to_string())].into();
        let current = Pagination {
            page: 2,
            size: 12,
            total_elements: 40,
            total_pages: 4,
        };
        let params = PageQuery::new().filter("q", "web").resolve(&base, &current);
        assert_eq!(params.page, 2);
        assert_eq!(params.size, 12);
        assert_eq!(params.filters["q"], "web");
        assert_eq!(params.filters["status"], "OPEN");

        let params = PageQuery::new().page(0).resolve(&base, &current);
        assert_eq!(params.page, 0);
    }

    #[test]
    fn to_query_appends_page_and_size() {
        let params = PageParams {
            page: 1,
            size: 12,
            filters: [("status".to_string(), "OPEN".to_string())].into(),
        };
        assert_eq!(
            params.to_query(),
            vec![
                ("status".to_string(), "OPEN".to_string()),
                ("page".to_string(), "1".to_string()),
                ("size".to_string(), "12".to_string()),
            ]
        );
    }
}
