//! Route patterns and the route index
//!
//! Patterns use axum's `:param` segment syntax so they can be handed to the
//! router unchanged.

use crate::facade::{RequestFlags, RouteLookup};
use axum::http::Method;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed route path such as `/users/:id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();

        let raw = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        Self { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Named parameters if `path` matches this pattern
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    let value = urlencoding::decode(part)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| part.to_string());
                    params.insert(name.clone(), value);
                }
            }
        }

        Some(params)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.captures(path).is_some()
    }
}

/// Per-route pipeline options
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteOptions {
    /// Overrides the server-wide hypermedia setting when set
    pub hypermedia: Option<bool>,
    pub flags: RequestFlags,
}

impl RouteOptions {
    pub fn without_hypermedia() -> Self {
        Self {
            hypermedia: Some(false),
            ..Self::default()
        }
    }

    pub fn protected() -> Self {
        Self {
            flags: RequestFlags {
                protected: true,
                ..RequestFlags::default()
            },
            ..Self::default()
        }
    }
}

/// Registered `(method, pattern)` pairs, used to confirm collection links
#[derive(Debug, Clone, Default)]
pub struct RouteIndex {
    routes: Vec<(Method, RoutePattern)>,
}

impl RouteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, method: Method, pattern: RoutePattern) {
        self.routes.push((method, pattern));
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RouteLookup for RouteIndex {
    fn has_get_route(&self, path: &str) -> bool {
        self.routes
            .iter()
            .any(|(method, pattern)| *method == Method::GET && pattern.matches(path))
    }
}
