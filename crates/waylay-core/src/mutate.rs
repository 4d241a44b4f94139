//! Inspection and mutation of held requests by id.
//!
//! Every operation looks the id up under the registry lock. The owning worker
//! is suspended for as long as the request is held, so the operator is the only
//! writer of its fields.

use bytes::Bytes;
use http::header::{COOKIE, HeaderName};
use http::uri::PathAndQuery;
use http::{HeaderValue, Method, Uri};
use tracing::debug;

use crate::error::InterceptError;
use crate::form;
use crate::request::{Cookie, FORM_URLENCODED, HeldRequest, RequestId};
use crate::session::CaptureSession;

fn header_name(key: &str) -> Result<HeaderName, InterceptError> {
    HeaderName::from_bytes(key.trim().as_bytes())
        .map_err(|_| InterceptError::InvalidCommand(format!("invalid header name `{key}`")))
}

fn header_value(value: &str) -> Result<HeaderValue, InterceptError> {
    HeaderValue::from_str(value)
        .map_err(|_| InterceptError::InvalidCommand(format!("invalid header value `{value}`")))
}

fn non_empty_key(key: &str) -> Result<&str, InterceptError> {
    if key.is_empty() {
        return Err(InterceptError::InvalidCommand("parameter name is empty".into()));
    }
    Ok(key)
}

fn reject_get(req: &HeldRequest) -> Result<(), InterceptError> {
    if req.method == Method::GET {
        return Err(InterceptError::MethodNotApplicable(Method::GET));
    }
    Ok(())
}

fn with_query(uri: &Uri, query: &str) -> Result<Uri, InterceptError> {
    let path_and_query = PathAndQuery::try_from(format!("{}?{query}", uri.path()))
        .map_err(|e| InterceptError::InvalidCommand(e.to_string()))?;
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).map_err(|e| InterceptError::InvalidCommand(e.to_string()))
}

impl CaptureSession {
    /// Every `(name, value)` header pair, one entry per value.
    pub fn list_headers(&self, id: RequestId) -> Result<Vec<(String, String)>, InterceptError> {
        self.with_held(id, |req| {
            req.headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect()
        })
    }

    pub fn get_header(&self, id: RequestId, key: &str) -> Result<Vec<String>, InterceptError> {
        let name = header_name(key)?;
        self.with_held(id, |req| {
            req.headers
                .get_all(&name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect()
        })
    }

    /// Replace every value of `key` with `value`.
    pub fn set_header(&self, id: RequestId, key: &str, value: &str) -> Result<(), InterceptError> {
        let name = header_name(key)?;
        let value = header_value(value)?;
        self.with_held(id, |req| {
            req.headers.insert(name, value);
        })
    }

    /// Values of `key` from the form body (when form-encoded) followed by the
    /// query string.
    pub fn get_param(&self, id: RequestId, key: &str) -> Result<Vec<String>, InterceptError> {
        self.with_held(id, |req| {
            let mut values = Vec::new();
            if req.method != Method::GET && req.is_form_encoded() {
                values.extend(
                    form::parse_pairs(&req.body)
                        .filter(|(k, _)| k == key)
                        .map(|(_, v)| v),
                );
            }
            if let Some(query) = req.query() {
                values.extend(
                    form::parse_pairs(query.as_bytes())
                        .filter(|(k, _)| k == key)
                        .map(|(_, v)| v),
                );
            }
            values
        })
    }

    /// Rewrite the first `key=...` pair of the query string in place.
    ///
    /// Returns `Ok(false)` when the key is not present; parameters are edited,
    /// never added.
    pub fn set_query_param(
        &self,
        id: RequestId,
        key: &str,
        value: &str,
    ) -> Result<bool, InterceptError> {
        let key = non_empty_key(key)?;
        let escaped = form::encode_component(value);
        self.with_held(id, |req| -> Result<bool, InterceptError> {
            let Some(query) = req.query() else {
                return Ok(false);
            };
            let Some(rewritten) = form::replace_first(query, key, &escaped) else {
                debug!(%id, key, "query parameter not present, nothing rewritten");
                return Ok(false);
            };
            req.uri = with_query(&req.uri, &rewritten)?;
            Ok(true)
        })?
    }

    /// Rewrite the first `key=...` pair of a form-encoded body in place.
    pub fn set_form_param(
        &self,
        id: RequestId,
        key: &str,
        value: &str,
    ) -> Result<bool, InterceptError> {
        let key = non_empty_key(key)?;
        let escaped = form::encode_component(value);
        self.with_held(id, |req| -> Result<bool, InterceptError> {
            if req.content_type() != Some(FORM_URLENCODED) {
                return Err(InterceptError::UnsupportedContentType);
            }
            let Some(body) = form::replace_first_bytes(&req.body, key, &escaped) else {
                debug!(%id, key, "form parameter not present, nothing rewritten");
                return Ok(false);
            };
            req.replace_body(body);
            Ok(true)
        })?
    }

    pub fn cookies(&self, id: RequestId) -> Result<Vec<Cookie>, InterceptError> {
        self.with_held(id, |req| req.cookies())
    }

    pub fn cookie(&self, id: RequestId, key: &str) -> Result<Cookie, InterceptError> {
        self.cookies(id)?
            .into_iter()
            .find(|cookie| cookie.name == key)
            .ok_or_else(|| InterceptError::CookieNotFound(key.to_string()))
    }

    /// Replace the whole `Cookie` header with `value`, or `key=value`.
    pub fn set_cookie(
        &self,
        id: RequestId,
        key: Option<&str>,
        value: &str,
    ) -> Result<(), InterceptError> {
        let line = match key {
            Some(key) => format!("{key}={value}"),
            None => value.to_string(),
        };
        let line = header_value(&line)?;
        self.with_held(id, |req| {
            req.headers.insert(COOKIE, line);
        })
    }

    pub fn get_body(&self, id: RequestId) -> Result<Bytes, InterceptError> {
        self.with_held(id, |req| -> Result<Bytes, InterceptError> {
            reject_get(req)?;
            Ok(req.body.clone())
        })?
    }

    pub fn set_body(&self, id: RequestId, body: impl Into<Bytes>) -> Result<(), InterceptError> {
        let body = body.into();
        self.with_held(id, |req| -> Result<(), InterceptError> {
            reject_get(req)?;
            req.replace_body(body);
            Ok(())
        })?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::Request;
    use http::header::{CONTENT_LENGTH, CONTENT_TYPE};

    use super::*;
    use crate::gate::{Admission, Hold, HoldPolicy, InterceptGate};

    struct Fixture {
        session: Arc<CaptureSession>,
        gate: InterceptGate,
    }

    impl Fixture {
        fn capturing() -> Self {
            let session = Arc::new(CaptureSession::new());
            session.start();
            let gate = InterceptGate::new(session.clone(), HoldPolicy::default());
            Self { session, gate }
        }

        fn hold(&self, request: Request<Bytes>) -> Hold {
            match self.gate.admit(request.into()) {
                Admission::Hold(hold) => hold,
                Admission::PassThrough(_) => panic!("request was not held"),
            }
        }
    }

    fn form_post(uri: &str, body: &'static str) -> Request<Bytes> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, FORM_URLENCODED)
            .header(CONTENT_LENGTH, body.len().to_string())
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Bytes> {
        Request::builder().uri(uri).body(Bytes::new()).unwrap()
    }

    #[test]
    fn test_set_header_overwrites_all_values() {
        let fx = Fixture::capturing();
        let mut req = get("http://example.com/");
        req.headers_mut().append("x-trace", HeaderValue::from_static("a"));
        req.headers_mut().append("x-trace", HeaderValue::from_static("b"));
        let hold = fx.hold(req);

        assert_eq!(fx.session.get_header(hold.id(), "X-Trace").unwrap(), vec!["a", "b"]);
        fx.session.set_header(hold.id(), "X-Trace", "v").unwrap();
        assert_eq!(fx.session.get_header(hold.id(), "x-trace").unwrap(), vec!["v"]);
    }

    #[test]
    fn test_list_headers() {
        let fx = Fixture::capturing();
        let hold = fx.hold(form_post("http://example.com/login", "a=1"));
        let headers = fx.session.list_headers(hold.id()).unwrap();
        assert!(headers.contains(&("content-type".to_string(), FORM_URLENCODED.to_string())));
        assert!(headers.contains(&("content-length".to_string(), "3".to_string())));
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let fx = Fixture::capturing();
        let hold = fx.hold(get("http://example.com/"));
        assert!(matches!(
            fx.session.set_header(hold.id(), "bad header", "v"),
            Err(InterceptError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_unknown_id() {
        let fx = Fixture::capturing();
        let _hold = fx.hold(get("http://example.com/"));
        let missing = RequestId(7);
        assert_eq!(
            fx.session.get_header(missing, "X"),
            Err(InterceptError::UnknownId(missing))
        );
        assert_eq!(
            fx.session.set_body(missing, "x"),
            Err(InterceptError::UnknownId(missing))
        );
        assert_eq!(fx.session.held_requests().unwrap().len(), 1);
    }

    #[test]
    fn test_get_param_combines_form_and_query() {
        let fx = Fixture::capturing();
        let hold = fx.hold(form_post("http://example.com/s?q=query&x=1", "q=body+value&z=2"));
        assert_eq!(
            fx.session.get_param(hold.id(), "q").unwrap(),
            vec!["body value", "query"]
        );
        assert_eq!(fx.session.get_param(hold.id(), "x").unwrap(), vec!["1"]);
        assert!(fx.session.get_param(hold.id(), "nope").unwrap().is_empty());
    }

    #[test]
    fn test_set_query_param_rewrites_in_place() {
        let fx = Fixture::capturing();
        let hold = fx.hold(form_post("http://example.com/api?x=1&y=2", ""));

        assert!(fx.session.set_query_param(hold.id(), "x", "9").unwrap());
        let uri = fx.session.held_requests().unwrap()[0].uri.clone();
        assert_eq!(uri, "http://example.com/api?x=9&y=2");
    }

    #[test]
    fn test_set_query_param_escapes_and_never_adds() {
        let fx = Fixture::capturing();
        let hold = fx.hold(get("http://example.com/search?q=old"));

        assert!(fx.session.set_query_param(hold.id(), "q", "a b&c").unwrap());
        assert_eq!(fx.session.get_param(hold.id(), "q").unwrap(), vec!["a b&c"]);
        assert!(!fx.session.set_query_param(hold.id(), "missing", "1").unwrap());
        assert_eq!(
            fx.session.held_requests().unwrap()[0].uri,
            "http://example.com/search?q=a+b%26c"
        );

        let bare = fx.hold(get("http://example.com/plain"));
        assert!(!fx.session.set_query_param(bare.id(), "q", "1").unwrap());
    }

    #[test]
    fn test_set_form_param() {
        let fx = Fixture::capturing();
        let hold = fx.hold(form_post("http://example.com/login", "user=bob&pass=secret"));

        assert!(fx.session.set_form_param(hold.id(), "pass", "p@ss word").unwrap());
        let body = fx.session.get_body(hold.id()).unwrap();
        assert_eq!(body, Bytes::from("user=bob&pass=p%40ss+word"));
        assert_eq!(
            fx.session.get_header(hold.id(), "content-length").unwrap(),
            vec![body.len().to_string()]
        );
    }

    #[test]
    fn test_set_form_param_requires_exact_form_content_type() {
        let fx = Fixture::capturing();
        let mut req = form_post("http://example.com/login", "user=bob");
        req.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );
        let hold = fx.hold(req);
        assert_eq!(
            fx.session.set_form_param(hold.id(), "user", "eve"),
            Err(InterceptError::UnsupportedContentType)
        );
        assert_eq!(fx.session.get_body(hold.id()).unwrap(), Bytes::from("user=bob"));
    }

    #[test]
    fn test_cookies() {
        let fx = Fixture::capturing();
        let mut req = get("http://example.com/");
        req.headers_mut()
            .insert(COOKIE, HeaderValue::from_static("session=abc; theme=dark"));
        let hold = fx.hold(req);

        assert_eq!(fx.session.cookie(hold.id(), "theme").unwrap().value, "dark");
        assert_eq!(
            fx.session.cookie(hold.id(), "missing"),
            Err(InterceptError::CookieNotFound("missing".into()))
        );

        fx.session.set_cookie(hold.id(), Some("a"), "b").unwrap();
        assert_eq!(fx.session.cookie(hold.id(), "a").unwrap().value, "b");
        let all = fx.session.cookies(hold.id()).unwrap();
        assert_eq!(all, vec![Cookie { name: "a".into(), value: "b".into() }]);

        fx.session.set_cookie(hold.id(), None, "x=1; y=2").unwrap();
        assert_eq!(fx.session.cookies(hold.id()).unwrap().len(), 2);
    }

    #[test]
    fn test_body_operations_reject_get() {
        let fx = Fixture::capturing();
        let hold = fx.hold(get("http://example.com/page"));
        let method_error = InterceptError::MethodNotApplicable(Method::GET);

        assert_eq!(fx.session.get_body(hold.id()), Err(method_error.clone()));
        assert_eq!(fx.session.set_body(hold.id(), "new"), Err(method_error));
        assert!(fx.session.get_header(hold.id(), "content-length").unwrap().is_empty());
    }

    #[test]
    fn test_set_body_replaces_wholesale() {
        let fx = Fixture::capturing();
        let hold = fx.hold(form_post("http://example.com/api", "a=1"));
        fx.session.set_body(hold.id(), r#"{"admin":true}"#).unwrap();
        assert_eq!(fx.session.get_body(hold.id()).unwrap(), Bytes::from(r#"{"admin":true}"#));
        assert_eq!(fx.session.get_header(hold.id(), "content-length").unwrap(), vec!["14"]);
    }

    #[test]
    fn test_commands_fail_outside_capturing() {
        let session = CaptureSession::new();
        assert_eq!(
            session.get_header(RequestId(0), "X"),
            Err(InterceptError::NotCapturing)
        );
    }
}
