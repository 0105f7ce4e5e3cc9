//! Format registries
//!
//! Three independent maps keyed by content type:
//! - parsers turn request bodies into JSON values
//! - serializers shape a [`ResponseEnvelope`] into the value to encode
//! - renderers encode that value into the wire string
//!
//! Keys are matched exactly (case-sensitive) after `;` parameters are stripped.

use crate::core::error::Result;
use crate::facade::envelope::ResponseEnvelope;
use crate::facade::render::{self, RenderContext};
use crate::facade::{parse, serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub type ParserFn = Arc<dyn Fn(&[u8]) -> Result<Value> + Send + Sync>;
pub type RendererFn = Arc<dyn Fn(&RenderContext<'_>, &Value) -> Result<String> + Send + Sync>;
pub type SerializerFn = Arc<dyn Fn(&ResponseEnvelope) -> Result<Value> + Send + Sync>;

/// Strip `;...` parameters and surrounding whitespace from a content type
pub fn base_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
}

/// A single content-type keyed map
pub struct Registry<F> {
    entries: HashMap<String, F>,
}

impl<F: Clone> Registry<F> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert or silently replace the entry for `content_type`
    pub fn insert(&mut self, content_type: &str, f: F) {
        self.entries.insert(base_type(content_type).to_string(), f);
    }

    pub fn get(&self, content_type: &str) -> Option<F> {
        self.entries.get(base_type(content_type)).cloned()
    }

    pub fn contains(&self, content_type: &str) -> bool {
        self.entries.contains_key(base_type(content_type))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered content types, sorted
    pub fn content_types(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl<F: Clone> Default for Registry<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// The parser, renderer and serializer registries owned by one facade
#[derive(Default)]
pub struct FormatRegistry {
    pub parsers: Registry<ParserFn>,
    pub renderers: Registry<RendererFn>,
    pub serializers: Registry<SerializerFn>,
}

impl FormatRegistry {
    /// Registry with no formats at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in formats
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();

        registry.parsers.insert("application/json", Arc::new(parse::json));
        registry.parsers.insert("application/jsonl", Arc::new(parse::jsonl));
        registry
            .parsers
            .insert("application/x-www-form-urlencoded", Arc::new(parse::form));

        let custom: SerializerFn = Arc::new(serialize::custom);
        let plain: SerializerFn = Arc::new(serialize::plain);

        let builtins: [(&str, RendererFn, &SerializerFn); 8] = [
            ("application/json", Arc::new(render::json), &custom),
            ("application/javascript", Arc::new(render::javascript), &custom),
            ("application/jsonl", Arc::new(render::jsonl), &plain),
            ("text/csv", Arc::new(render::csv), &plain),
            ("text/plain", Arc::new(render::plain), &plain),
            ("text/html", Arc::new(render::html), &custom),
            ("application/xml", Arc::new(render::xml), &custom),
            ("application/yaml", Arc::new(render::yaml), &custom),
        ];

        for (content_type, renderer, serializer) in builtins {
            registry.renderers.insert(content_type, renderer);
            registry.serializers.insert(content_type, serializer.clone());
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_type_strips_parameters() {
        assert_eq!(base_type("application/json; charset=utf-8"), "application/json");
        assert_eq!(base_type(" text/csv "), "text/csv");
        assert_eq!(base_type(""), "");
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let mut registry: Registry<u8> = Registry::new();
        registry.insert("text/plain", 1);

        assert_eq!(registry.get("text/plain;charset=utf-8"), Some(1));
        assert_eq!(registry.get("Text/Plain"), None);
    }

    #[test]
    fn test_insert_overwrites() {
        let mut registry: Registry<u8> = Registry::new();
        registry.insert("text/plain", 1);
        registry.insert("text/plain; q=1", 2);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("text/plain"), Some(2));
    }

    #[test]
    fn test_defaults_cover_every_renderer_with_a_serializer() {
        let registry = FormatRegistry::with_defaults();

        assert_eq!(registry.renderers.len(), 8);
        for content_type in registry.renderers.content_types() {
            assert!(
                registry.serializers.contains(content_type),
                "no serializer for {}",
                content_type
            );
        }
        assert!(registry.parsers.contains("application/x-www-form-urlencoded"));
        assert!(FormatRegistry::empty().renderers.is_empty());
    }
}
