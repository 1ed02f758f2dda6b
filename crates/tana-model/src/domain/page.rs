use serde::{Deserialize, Serialize};

/// One page of a paginated list response.
///
/// `total` counts the whole filtered set, not just this page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// A single complete page holding every item, used by tests and demos.
    pub fn complete(items: Vec<T>, page_size: u32) -> Self {
        let total = items.len() as u64;
        Self {
            items,
            total,
            page: 1,
            page_size,
            has_more: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_deserializes_from_api_shape() {
        let json = r#"{ "items": ["a", "b"], "total": 7, "page": 2, "pageSize": 2, "hasMore": true }"#;
        let page: Page<String> = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 7);
        assert!(page.has_more);
    }
}
