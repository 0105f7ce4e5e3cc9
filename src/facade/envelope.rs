//! Response envelope and hypermedia link types

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Relation type of a hypermedia link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rel {
    Collection,
    Item,
    Related,
    First,
    Prev,
    Next,
    Last,
}

impl Rel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rel::Collection => "collection",
            Rel::Item => "item",
            Rel::Related => "related",
            Rel::First => "first",
            Rel::Prev => "prev",
            Rel::Next => "next",
            Rel::Last => "last",
        }
    }
}

impl fmt::Display for Rel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `{uri, rel}` pair describing a related resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Link {
    pub uri: String,
    pub rel: Rel,
}

impl Link {
    pub fn new(uri: impl Into<String>, rel: Rel) -> Self {
        Self {
            uri: uri.into(),
            rel,
        }
    }
}

/// `{data, error, links, status}` wrapper produced for every response
///
/// `data` and `error` are never both set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub data: Option<Value>,
    pub error: Option<String>,
    pub links: Vec<Link>,
    pub status: u16,
}

impl ResponseEnvelope {
    pub fn from_value(data: Value, status: u16) -> Self {
        Self {
            data: Some(data),
            error: None,
            links: Vec::new(),
            status,
        }
    }

    pub fn from_error(error: impl Into<String>, status: u16) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
            links: Vec::new(),
            status,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Sort links by `(rel, uri)` and drop duplicate pairs
    pub fn normalize_links(&mut self) {
        self.links.sort_by(|a, b| {
            a.rel
                .as_str()
                .cmp(b.rel.as_str())
                .then_with(|| a.uri.cmp(&b.uri))
        });
        self.links.dedup();
    }

    /// `Link` header value, `<uri>; rel="rel"` entries joined by commas
    pub fn link_header(&self) -> Option<String> {
        if self.links.is_empty() {
            return None;
        }

        Some(
            self.links
                .iter()
                .map(|link| format!("<{}>; rel=\"{}\"", link.uri, link.rel))
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_and_error_are_exclusive() {
        let ok = ResponseEnvelope::from_value(json!([1, 2]), 200);
        assert!(ok.error.is_none());
        assert_eq!(ok.data, Some(json!([1, 2])));

        let err = ResponseEnvelope::from_error("boom", 500);
        assert!(err.data.is_none());
        assert!(err.is_error());
    }

    #[test]
    fn test_normalize_links_sorts_and_dedups() {
        let mut envelope = ResponseEnvelope::from_value(json!(null), 200);
        envelope.links = vec![
            Link::new("/users/2", Rel::Related),
            Link::new("/items", Rel::Collection),
            Link::new("/users/1", Rel::Related),
            Link::new("/users/2", Rel::Related),
            Link::new("/items?page=3", Rel::Last),
        ];

        envelope.normalize_links();

        assert_eq!(
            envelope.links,
            vec![
                Link::new("/items", Rel::Collection),
                Link::new("/items?page=3", Rel::Last),
                Link::new("/users/1", Rel::Related),
                Link::new("/users/2", Rel::Related),
            ]
        );
    }

    #[test]
    fn test_link_header_format() {
        let mut envelope = ResponseEnvelope::from_value(json!({}), 200);
        assert_eq!(envelope.link_header(), None);

        envelope.links = vec![
            Link::new("/somethings", Rel::Collection),
            Link::new("/users/123", Rel::Related),
        ];
        assert_eq!(
            envelope.link_header().unwrap(),
            r#"</somethings>; rel="collection", </users/123>; rel="related""#
        );
    }

    #[test]
    fn test_link_serializes_rel_lowercase() {
        let value = serde_json::to_value(Link::new("/a", Rel::Prev)).unwrap();
        assert_eq!(value, json!({"uri": "/a", "rel": "prev"}));
    }
}
