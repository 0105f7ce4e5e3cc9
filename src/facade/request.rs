//! Per-request context handed to handlers and to every pipeline stage

use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Flags that force a `private` cache-control policy on the response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFlags {
    pub protected: bool,
    pub csrf: bool,
    pub private: bool,
}

impl RequestFlags {
    pub fn any(&self) -> bool {
        self.protected || self.csrf || self.private
    }
}

/// Everything the pipeline knows about an incoming request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    /// Query pairs in their original order, already percent-decoded
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub params: HashMap<String, String>,
    pub client_addr: IpAddr,
    pub session_id: Option<String>,
    pub body: Option<Value>,
    pub flags: RequestFlags,
}

impl RequestContext {
    /// Build a context from a method and a `path?query` target
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        Self {
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query: query.map(parse_query).unwrap_or_default(),
            headers: HeaderMap::new(),
            params: HashMap::new(),
            client_addr: IpAddr::from([127, 0, 0, 1]),
            session_id: None,
            body: None,
            flags: RequestFlags::default(),
        }
    }

    /// Build a context from HTTP request parts
    pub fn from_parts(parts: &Parts, remote: Option<SocketAddr>, session_cookie: &str) -> Self {
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let mut ctx = Self::new(parts.method.clone(), target);
        ctx.headers = parts.headers.clone();
        ctx.client_addr = extract_client_ip(&parts.headers, remote);
        ctx.session_id = extract_session_id(&parts.headers, session_cookie);
        ctx
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_client(mut self, addr: IpAddr) -> Self {
        self.client_addr = addr;
        self
    }

    pub fn with_flags(mut self, flags: RequestFlags) -> Self {
        self.flags = flags;
        self
    }

    /// First value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Identity used for rate limiting: session id if present, else network address
    pub fn client_id(&self) -> String {
        match &self.session_id {
            Some(id) => id.clone(),
            None => self.client_addr.to_string(),
        }
    }

    /// Non-empty path segments
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Absolute URL of this request, honouring `x-forwarded-proto`
    pub fn absolute_url(&self) -> String {
        let scheme = self
            .header("x-forwarded-proto")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("http");
        let host = self.header(header::HOST.as_str()).unwrap_or("localhost");

        let mut url = format!("{}://{}{}", scheme, host, self.path);
        if !self.query.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.query.iter())
                .finish();
            url.push('?');
            url.push_str(&query);
        }
        url
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Extract client IP address
///
/// Looks at, in order:
/// 1. X-Forwarded-For header (first entry is the client)
/// 2. X-Real-IP header
/// 3. The connection's remote address
///
/// Falls back to localhost when none is available.
fn extract_client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> IpAddr {
    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    let real_ip = headers
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());
    if let Some(ip) = real_ip {
        return ip;
    }

    remote
        .map(|addr| addr.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

fn extract_session_id(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_of(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn test_new_splits_path_and_query() {
        let ctx = RequestContext::new(Method::GET, "/items?page=2&email=user%40domain.com");
        assert_eq!(ctx.path, "/items");
        assert_eq!(ctx.query_param("page"), Some("2"));
        assert_eq!(ctx.query_param("email"), Some("user@domain.com"));
        assert_eq!(ctx.query_param("missing"), None);
        assert_eq!(ctx.segments(), vec!["items"]);
    }

    #[test]
    fn test_client_id_prefers_session() {
        let ctx = RequestContext::new(Method::GET, "/").with_client(IpAddr::from([10, 0, 0, 7]));
        assert_eq!(ctx.client_id(), "10.0.0.7");
        assert_eq!(ctx.with_session("abc").client_id(), "abc");
    }

    #[test]
    fn test_extract_client_ip_from_x_forwarded_for() {
        let parts = parts_of(
            Request::builder()
                .uri("/test")
                .header("X-Forwarded-For", "192.168.1.100, 10.0.0.1")
                .body(())
                .unwrap(),
        );

        let ctx = RequestContext::from_parts(&parts, None, "session_id");
        assert_eq!(ctx.client_addr, IpAddr::from([192, 168, 1, 100]));
    }

    #[test]
    fn test_extract_client_ip_from_remote_addr() {
        let parts = parts_of(Request::builder().uri("/test").body(()).unwrap());
        let remote: SocketAddr = "172.16.0.9:5000".parse().unwrap();

        let ctx = RequestContext::from_parts(&parts, Some(remote), "session_id");
        assert_eq!(ctx.client_addr, IpAddr::from([172, 16, 0, 9]));
    }

    #[test]
    fn test_session_id_from_cookie() {
        let parts = parts_of(
            Request::builder()
                .uri("/test")
                .header("cookie", "theme=dark; sid=a%20b")
                .body(())
                .unwrap(),
        );

        let ctx = RequestContext::from_parts(&parts, None, "sid");
        assert_eq!(ctx.session_id.as_deref(), Some("a b"));

        let ctx = RequestContext::from_parts(&parts, None, "session_id");
        assert_eq!(ctx.session_id, None);
    }

    #[test]
    fn test_absolute_url_uses_forwarded_proto() {
        let ctx = RequestContext::new(Method::GET, "/items?page=2")
            .with_header(header::HOST, "api.example.com")
            .with_header(HeaderName::from_static("x-forwarded-proto"), "https");
        assert_eq!(ctx.absolute_url(), "https://api.example.com/items?page=2");
    }
}
