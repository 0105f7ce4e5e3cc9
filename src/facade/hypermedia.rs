//! Hypermedia derivation
//!
//! Infers `collection`, `item` and `related` links from arbitrary payloads and
//! paginates array responses to GET requests:
//! - The collection link points at the parent path when a GET route serves it
//! - Array elements that look like URIs become `item` links
//! - Object keys such as `id`, `_id` and `<word>_id` / `_uuid` / `_url` / `_uri`
//!   become `item` or `related` links
//! - Paginated arrays get `first` / `prev` / `next` / `last` links
//!
//! Collection names for `<word>_id` keys use a naive pluralization: drop one
//! trailing `s`, turn a trailing `y` into `ie`, append `s`. `city_id` maps to
//! `cities`; irregular nouns map wrongly and that is part of the contract.

use crate::facade::envelope::{Link, Rel, ResponseEnvelope};
use crate::facade::request::RequestContext;
use axum::http::Method;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;

lazy_static! {
    static ref ID_KEY: Regex = Regex::new(r"(?i)^_?id$").unwrap();
    static ref SUFFIX_KEY: Regex = Regex::new(r"(?i)^(\w+?)_(id|uuid|url|uri)$").unwrap();
    static ref SCHEME: Regex =
        Regex::new(r"(?i)^(https?|wss?|ftp|file|mailto|urn|data):").unwrap();
}

pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Answers whether the routing layer serves GET at a path
pub trait RouteLookup: Send + Sync {
    fn has_get_route(&self, path: &str) -> bool;
}

impl<F> RouteLookup for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn has_get_route(&self, path: &str) -> bool {
        self(path)
    }
}

/// Lookup for a facade with no routing layer attached
pub struct NoRoutes;

impl RouteLookup for NoRoutes {
    fn has_get_route(&self, _path: &str) -> bool {
        false
    }
}

/// Shape of a payload, resolved once before derivation
enum PayloadKind {
    Array(Vec<Value>),
    Object(Map<String, Value>),
    Scalar(Value),
}

impl PayloadKind {
    fn of(value: Value) -> Self {
        match value {
            Value::Array(items) => PayloadKind::Array(items),
            Value::Object(map) => PayloadKind::Object(map),
            other => PayloadKind::Scalar(other),
        }
    }
}

/// How an object key relates to another resource
enum KeyMatch {
    /// `id` / `_id`: the item itself within the default collection
    Identifier,
    /// `<word>_id` and friends: a resource in the derived collection
    Related(String),
}

fn classify_key(key: &str) -> Option<KeyMatch> {
    if ID_KEY.is_match(key) {
        return Some(KeyMatch::Identifier);
    }

    SUFFIX_KEY
        .captures(key)
        .and_then(|caps| caps.get(1))
        .map(|stem| KeyMatch::Related(pluralize(stem.as_str())))
}

/// Collection name for a key stem
pub fn pluralize(stem: &str) -> String {
    let stem = stem.strip_suffix('s').unwrap_or(stem);
    match stem.strip_suffix('y') {
        Some(base) => format!("{}ies", base),
        None => format!("{}s", stem),
    }
}

/// Contains `/` or starts with a scheme marker
pub fn is_uri(value: &str) -> bool {
    value.contains('/') || SCHEME.is_match(value)
}

/// Parent path of a non-root path, `/` for top-level resources
pub fn collection_prefix(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let cut = trimmed.rfind('/')?;
    let prefix = &trimmed[..cut];
    Some(if prefix.is_empty() {
        "/".to_string()
    } else {
        prefix.to_string()
    })
}

/// Collects links for one request, refusing self links and repeated URIs
struct LinkCollector<'r> {
    request_path: &'r str,
    seen: HashSet<String>,
    links: Vec<Link>,
}

impl<'r> LinkCollector<'r> {
    fn new(request_path: &'r str, existing: Vec<Link>) -> Self {
        Self {
            request_path,
            seen: existing.iter().map(|link| link.uri.clone()).collect(),
            links: existing,
        }
    }

    /// Structural links (collection, pagination) bypass the seen set
    fn push(&mut self, uri: String, rel: Rel) {
        self.links.push(Link::new(uri, rel));
    }

    /// Derived links are added once per URI and never point at the request itself
    fn derive(&mut self, uri: String, rel: Rel) {
        if uri != self.request_path && self.seen.insert(uri.clone()) {
            self.links.push(Link::new(uri, rel));
        }
    }
}

/// Derives links for responses on behalf of one facade
pub struct HypermediaDeriver<'a> {
    routes: &'a dyn RouteLookup,
    page_size: usize,
}

impl<'a> HypermediaDeriver<'a> {
    pub fn new(routes: &'a dyn RouteLookup, page_size: usize) -> Self {
        Self {
            routes,
            page_size: if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size },
        }
    }

    /// Build an envelope for `raw` at `status` and augment it with links
    pub fn derive(&self, request: &RequestContext, status: u16, raw: Value) -> ResponseEnvelope {
        self.augment(request, ResponseEnvelope::from_value(raw, status))
    }

    /// Add links to an envelope; only successful (200-206) responses change
    pub fn augment(&self, request: &RequestContext, mut envelope: ResponseEnvelope) -> ResponseEnvelope {
        if !(200..=206).contains(&envelope.status) {
            return envelope;
        }

        let mut links = LinkCollector::new(&request.path, std::mem::take(&mut envelope.links));

        if let Some(prefix) = collection_prefix(&request.path) {
            if self.routes.has_get_route(&prefix) {
                links.push(prefix, Rel::Collection);
            }
        }

        let segments = request.segments();
        envelope.data = envelope.data.take().and_then(|data| match PayloadKind::of(data) {
            PayloadKind::Array(items) => {
                Some(Value::Array(self.array(request, items, &segments, &mut links)))
            }
            PayloadKind::Object(map) => {
                // Item links inside a single resource refer to its parent collection
                let mut parent = segments.clone();
                if parent.len() > 1 {
                    parent.pop();
                }
                let collection = parent.last().copied().unwrap_or_default();

                if marshal(&map, Rel::Item, collection, &mut links) == 0 {
                    None
                } else {
                    Some(Value::Object(map))
                }
            }
            PayloadKind::Scalar(value) => Some(value),
        });

        envelope.links = links.links;
        envelope.normalize_links();
        envelope
    }

    fn array(
        &self,
        request: &RequestContext,
        items: Vec<Value>,
        segments: &[&str],
        links: &mut LinkCollector<'_>,
    ) -> Vec<Value> {
        let items = if request.method == Method::GET {
            self.paginate(request, items, links)
        } else {
            items
        };

        let collection = segments.last().copied().unwrap_or_default();
        for item in &items {
            match item {
                Value::String(s) if is_uri(s) => links.derive(s.clone(), Rel::Item),
                Value::Object(map) => {
                    marshal(map, Rel::Item, collection, links);
                }
                _ => {}
            }
        }

        items
    }

    fn paginate(
        &self,
        request: &RequestContext,
        items: Vec<Value>,
        links: &mut LinkCollector<'_>,
    ) -> Vec<Value> {
        let page = positive_param(request, "page").unwrap_or(1);
        let page_size = positive_param(request, "page_size").unwrap_or(self.page_size);
        let page_count = (items.len() + page_size - 1) / page_size;

        if page_count <= 1 {
            return items;
        }

        let window: Vec<Value> = items
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        if page > 1 {
            links.push(page_uri(request, 1), Rel::First);
            if page <= page_count {
                links.push(page_uri(request, page - 1), Rel::Prev);
            }
        }
        if page + 1 < page_count {
            links.push(page_uri(request, page + 1), Rel::Next);
        }
        if page != page_count {
            links.push(page_uri(request, page_count), Rel::Last);
        }

        window
    }
}

/// Non-numeric, zero and negative values fall back to the default
fn positive_param(request: &RequestContext, name: &str) -> Option<usize> {
    request
        .query_param(name)
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|value| *value > 0)
        .map(|value| value as usize)
}

/// Request URI with `page` replaced, built from the parsed query pairs
fn page_uri(request: &RequestContext, page: usize) -> String {
    let page = page.to_string();
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    let mut placed = false;

    for (key, value) in &request.query {
        if key == "page" {
            if !placed {
                query.append_pair("page", &page);
                placed = true;
            }
        } else {
            query.append_pair(key, value);
        }
    }
    if !placed {
        query.append_pair("page", &page);
    }

    format!("{}?{}", request.path, query.finish())
}

/// Scan an object's keys recursively, returning how many identifier keys matched
fn marshal(
    map: &Map<String, Value>,
    default_rel: Rel,
    collection: &str,
    links: &mut LinkCollector<'_>,
) -> usize {
    let mut matched = 0;

    for (key, value) in map {
        if value.is_null() {
            continue;
        }

        match classify_key(key) {
            Some(KeyMatch::Identifier) => {
                matched += 1;
                if let Some(uri) = link_target(value, collection) {
                    links.derive(uri, default_rel);
                }
            }
            Some(KeyMatch::Related(related)) => {
                matched += 1;
                if let Some(uri) = link_target(value, &related) {
                    links.derive(uri, Rel::Related);
                }
            }
            None => {}
        }

        // Nested resources are named after the key that holds them
        match value {
            Value::Object(inner) => matched += marshal(inner, Rel::Related, key, links),
            Value::Array(items) => {
                for inner in items.iter().filter_map(Value::as_object) {
                    matched += marshal(inner, Rel::Related, key, links);
                }
            }
            _ => {}
        }
    }

    matched
}

fn link_target(value: &Value, collection: &str) -> Option<String> {
    let key = match value {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };

    Some(if is_uri(&key) {
        key
    } else if collection.is_empty() {
        format!("/{}", key)
    } else {
        format!("/{}/{}", collection, key)
    })
}
