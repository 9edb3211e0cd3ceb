//! Query-parameter and path-segment parsing
//!
//! SensorThings addresses entities with parenthesised ids inside one path
//! segment (`Things(station-1)`) and drives representation through OData
//! query options: `$expand`, `$top`, `$skip`, `$filter`, `$count`.
//! `$filter` expressions are parsed by an external component; the binding
//! carries the raw text through and applies no criterion of its own.

use serde::Deserialize;

use sensorgate_common::{GatewayError, Result};
use sensorgate_sensorthings::dto::ResultList;
use sensorgate_sensorthings::expand::ExpansionSettings;

/// OData query options accepted on every read endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ODataQuery {
    #[serde(rename = "$expand")]
    pub expand: Option<String>,

    #[serde(rename = "$top")]
    pub top: Option<usize>,

    #[serde(rename = "$skip")]
    pub skip: Option<usize>,

    #[serde(rename = "$filter")]
    pub filter: Option<String>,

    #[serde(rename = "$count")]
    pub count: Option<bool>,
}

/// Resolved pagination window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page {
    pub skip: usize,
    pub top: usize,
}

impl ODataQuery {
    /// Parse the `$expand` option into settings; absent means none.
    pub fn expansions(&self) -> Result<ExpansionSettings> {
        match &self.expand {
            Some(raw) => ExpansionSettings::parse(raw),
            None => Ok(ExpansionSettings::empty()),
        }
    }

    /// The pagination window, with the endpoint's default page size.
    pub fn page(&self, default_top: usize) -> Page {
        Page {
            skip: self.skip.unwrap_or(0),
            top: self.top.unwrap_or(default_top),
        }
    }
}

/// One parsed path segment: a collection name with an optional
/// parenthesised id.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRef {
    pub collection: String,
    pub id: Option<String>,
}

impl EntityRef {
    /// Parse `Things` or `Things(station-1)`.
    pub fn parse(segment: &str) -> Result<Self> {
        match segment.find('(') {
            None => Ok(Self {
                collection: segment.to_string(),
                id: None,
            }),
            Some(open) => {
                if !segment.ends_with(')') || open == 0 {
                    return Err(GatewayError::BadRequest(format!(
                        "malformed entity address: {segment}"
                    )));
                }
                let id = &segment[open + 1..segment.len() - 1];
                if id.is_empty() {
                    return Err(GatewayError::BadRequest(format!(
                        "malformed entity address: {segment}"
                    )));
                }
                // ids may arrive quoted per OData conventions
                let id = id.trim_matches('\'');
                Ok(Self {
                    collection: segment[..open].to_string(),
                    id: Some(id.to_string()),
                })
            }
        }
    }

    /// The id, or a bad-request error for endpoints that need one.
    pub fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| GatewayError::BadRequest("entity id required".to_string()))
    }
}

/// Apply a pagination window to an in-memory collection, producing the
/// count and continuation link of the page.
pub fn paginate<T>(items: Vec<T>, page: Page, collection_link: &str) -> ResultList<T> {
    let total = items.len();
    let value: Vec<T> = items.into_iter().skip(page.skip).take(page.top).collect();
    let next_skip = page.skip + page.top;
    let next_link = (next_skip < total).then(|| {
        format!(
            "{}?$top={}&$skip={}",
            collection_link, page.top, next_skip
        )
    });
    ResultList {
        count: Some(total as u64),
        next_link,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_entity_ref_parsing() {
        assert_eq!(
            EntityRef::parse("Things").unwrap(),
            EntityRef {
                collection: "Things".to_string(),
                id: None
            }
        );
        assert_eq!(
            EntityRef::parse("Things(station-1)").unwrap(),
            EntityRef {
                collection: "Things".to_string(),
                id: Some("station-1".to_string())
            }
        );
        assert_eq!(
            EntityRef::parse("Observations(p~s~r~1f)").unwrap().id.as_deref(),
            Some("p~s~r~1f")
        );
        assert_eq!(
            EntityRef::parse("Things('quoted')").unwrap().id.as_deref(),
            Some("quoted")
        );
    }

    #[test]
    fn test_entity_ref_rejects_malformed_segments() {
        assert!(EntityRef::parse("Things(").is_err());
        assert!(EntityRef::parse("Things()").is_err());
        assert!(EntityRef::parse("(abc)").is_err());
    }

    #[test]
    fn test_page_defaults() {
        let query = ODataQuery::default();
        assert_eq!(query.page(25), Page { skip: 0, top: 25 });

        let query = ODataQuery {
            top: Some(10),
            skip: Some(5),
            ..Default::default()
        };
        assert_eq!(query.page(25), Page { skip: 5, top: 10 });
    }

    #[test]
    fn test_paginate_produces_next_link() {
        let page = Page { skip: 0, top: 2 };
        let list = paginate(vec![1, 2, 3, 4], page, "https://gw/v1.1/Things");
        assert_eq!(list.count, Some(4));
        assert_eq!(list.value, vec![1, 2]);
        assert_eq!(
            list.next_link.as_deref(),
            Some("https://gw/v1.1/Things?$top=2&$skip=2")
        );

        let last = paginate(vec![1, 2], Page { skip: 0, top: 25 }, "x");
        assert_eq!(last.next_link, None);
    }
}
