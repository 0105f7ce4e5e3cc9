//! Built-in renderers
//!
//! Each renderer turns an already-serialized value into the response body for
//! one content type. Format options (indent, callback) arrive through
//! [`RenderContext`].

use crate::core::error::{FacadeError, Result};
use crate::facade::request::RequestContext;
use lazy_static::lazy_static;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

lazy_static! {
    static ref XML_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9._-]*$").unwrap();
}

/// Inputs available to a renderer besides the value itself
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub request: &'a RequestContext,
    pub format: &'a str,
    pub status: u16,
    pub indent: usize,
    pub callback: &'a str,
}

pub fn json(ctx: &RenderContext<'_>, value: &Value) -> Result<String> {
    encode_json(value, ctx.indent).map_err(|e| FacadeError::render(ctx.format, e))
}

/// JSON wrapped in a callback invocation
pub fn javascript(ctx: &RenderContext<'_>, value: &Value) -> Result<String> {
    let body = encode_json(value, 0).map_err(|e| FacadeError::render(ctx.format, e))?;
    Ok(format!("{}({});", ctx.callback, body))
}

/// One compact JSON value per line; arrays are split into their elements
pub fn jsonl(ctx: &RenderContext<'_>, value: &Value) -> Result<String> {
    let lines = match value {
        Value::Array(items) => items
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>(),
        other => serde_json::to_string(other).map(|line| vec![line]),
    }
    .map_err(|e| FacadeError::render(ctx.format, e))?;

    Ok(lines.join("\n"))
}

/// Header row is the union of object keys in first-seen order; scalar rows
/// land in a `value` column
pub fn csv(ctx: &RenderContext<'_>, value: &Value) -> Result<String> {
    let rows: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let mut headers: Vec<String> = Vec::new();
    for row in &rows {
        match row {
            Value::Object(map) => {
                for key in map.keys() {
                    if !headers.contains(key) {
                        headers.push(key.clone());
                    }
                }
            }
            _ => {
                if !headers.iter().any(|h| h == "value") {
                    headers.push("value".to_string());
                }
            }
        }
    }

    if headers.is_empty() {
        return Ok(String::new());
    }

    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&headers)
        .map_err(|e| FacadeError::render(ctx.format, e))?;

    for row in rows {
        let record: Vec<String> = headers
            .iter()
            .map(|header| match row {
                Value::Object(map) => map.get(header).map(csv_cell).unwrap_or_default(),
                other if header == "value" => csv_cell(other),
                _ => String::new(),
            })
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| FacadeError::render(ctx.format, e))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| FacadeError::render(ctx.format, e))?;
    String::from_utf8(bytes).map_err(|e| FacadeError::render(ctx.format, e))
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn plain(_ctx: &RenderContext<'_>, value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    })
}

/// Minimal page showing the absolute request URL and the pretty-printed body
pub fn html(ctx: &RenderContext<'_>, value: &Value) -> Result<String> {
    let body = encode_json(value, ctx.indent.max(2)).map_err(|e| FacadeError::render(ctx.format, e))?;
    let url = escape_html(&ctx.request.absolute_url());

    Ok(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<h1><a href=\"{url}\">{url}</a></h1>\n<p>{status}</p>\n<pre>{body}</pre>\n</body>\n</html>\n",
        title = escape_html(&ctx.request.path),
        url = url,
        status = ctx.status,
        body = escape_html(&body),
    ))
}

pub fn xml(ctx: &RenderContext<'_>, value: &Value) -> Result<String> {
    let mut writer = if ctx.indent > 0 {
        Writer::new_with_indent(Vec::new(), b' ', ctx.indent)
    } else {
        Writer::new(Vec::new())
    };

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .and_then(|_| write_xml(&mut writer, "o", value))
        .map_err(|e| FacadeError::render(ctx.format, e))?;

    String::from_utf8(writer.into_inner()).map_err(|e| FacadeError::render(ctx.format, e))
}

fn write_xml<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &Value,
) -> std::result::Result<(), quick_xml::Error> {
    // Keys that are not valid element names become <item key="...">
    let tag = if XML_NAME.is_match(name) && !name.to_ascii_lowercase().starts_with("xml") {
        name
    } else {
        "item"
    };
    let mut start = BytesStart::new(tag);
    if tag != name {
        start.push_attribute(("key", name));
    }

    match value {
        Value::Null => writer.write_event(Event::Empty(start))?,
        Value::Array(items) => {
            writer.write_event(Event::Start(start))?;
            for item in items {
                write_xml(writer, "item", item)?;
            }
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }
        Value::Object(map) => {
            writer.write_event(Event::Start(start))?;
            for (key, item) in map {
                write_xml(writer, key, item)?;
            }
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }
        scalar => {
            let text = match scalar {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(&text)))?;
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }
    }

    Ok(())
}

pub fn yaml(ctx: &RenderContext<'_>, value: &Value) -> Result<String> {
    serde_yml::to_string(value).map_err(|e| FacadeError::render(ctx.format, e))
}

fn encode_json(value: &Value, indent: usize) -> serde_json::Result<String> {
    if indent == 0 {
        return serde_json::to_string(value);
    }

    let indent = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;

    // serde_json only ever emits valid UTF-8
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
