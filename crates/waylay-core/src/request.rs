use std::fmt;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Method, Request, Uri, Version};
use serde::Serialize;

/// Identifier of a held request, unique within one capture epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The mutable record of one in-flight request.
///
/// The body is fully buffered, so reading it never consumes it and replacing it
/// simply swaps the bytes.
#[derive(Debug, Clone)]
pub struct HeldRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HeldRequest {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Raw `Content-Type` header value, if present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Whether the media type (ignoring parameters) is form-encoded.
    pub fn is_form_encoded(&self) -> bool {
        self.content_type()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_URLENCODED))
    }

    /// Swap the body and keep the framing headers consistent with it.
    pub fn replace_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        self.headers.remove(TRANSFER_ENCODING);
        self.headers
            .insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
    }

    /// Cookies parsed from every `Cookie` header, in header order.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(Cookie::parse)
            .collect()
    }

    pub fn summary(&self, id: RequestId) -> HeldSummary {
        HeldSummary {
            id,
            method: self.method.to_string(),
            uri: self.uri.to_string(),
        }
    }

    pub fn into_request(self) -> Request<Bytes> {
        let mut request = Request::new(self.body);
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers;
        request
    }
}

impl From<Request<Bytes>> for HeldRequest {
    fn from(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
        }
    }
}

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// One `name=value` pair from a `Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    fn parse(pair: &str) -> Option<Self> {
        let pair = pair.trim();
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// What `list request` shows for a held request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeldSummary {
    pub id: RequestId,
    pub method: String,
    pub uri: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, uri: &str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn test_request_id_honours_width() {
        assert_eq!(format!("[{:>2}]", RequestId(0)), "[ 0]");
        assert_eq!(format!("[{:>2}]", RequestId(12)), "[12]");
        assert_eq!(format!("{:<3}|", RequestId(7)), "7  |");
    }

    #[test]
    fn test_cookies_across_headers() {
        let mut req = request("GET", "http://example.com/");
        req.headers_mut()
            .append(COOKIE, HeaderValue::from_static("a=1; b=\"two\""));
        req.headers_mut()
            .append(COOKIE, HeaderValue::from_static("flag; =skipped"));
        let held = HeldRequest::from(req);

        let cookies = held.cookies();
        let pairs: Vec<String> = cookies.iter().map(ToString::to_string).collect();
        assert_eq!(pairs, vec!["a=1", "b=two", "flag="]);
    }

    #[test]
    fn test_form_encoded_ignores_parameters() {
        let mut req = request("POST", "http://example.com/login");
        req.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );
        assert!(HeldRequest::from(req).is_form_encoded());
    }

    #[test]
    fn test_replace_body_updates_framing() {
        let mut req = request("POST", "http://example.com/upload");
        req.headers_mut()
            .insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        let mut held = HeldRequest::from(req);

        held.replace_body("hello");

        assert_eq!(held.headers.get(CONTENT_LENGTH).unwrap(), "5");
        assert!(held.headers.get(TRANSFER_ENCODING).is_none());
    }

    #[test]
    fn test_round_trip_through_http_request() {
        let held = HeldRequest::from(request("PUT", "http://example.com/a?b=c"));
        let back = held.clone().into_request();
        assert_eq!(back.method(), Method::PUT);
        assert_eq!(back.uri().query(), Some("b=c"));
        assert_eq!(held.summary(RequestId(3)).uri, "http://example.com/a?b=c");
    }
}
