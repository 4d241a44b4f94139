use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Request, Version};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};
use waylay_core::error::ForwardError;
use waylay_core::forward::{ForwardedResponse, Forwarder};
use waylay_core::request::HeldRequest;

type HttpClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Headers that describe a single hop and must not be relayed.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwards requests with a pooled hyper client that speaks plain HTTP or
/// HTTPS depending on the URL scheme.
#[derive(Clone)]
pub struct HyperForwarder {
    client: HttpClient,
}

impl HyperForwarder {
    pub fn new() -> Self {
        let connector = match HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder.https_or_http().enable_http1().build(),
            Err(e) => {
                warn!("no native root certificates ({e}); https upstreams will fail verification");
                let config = rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth();
                HttpsConnectorBuilder::new()
                    .with_tls_config(config)
                    .https_or_http()
                    .enable_http1()
                    .build()
            }
        };
        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
        }
    }
}

impl Default for HyperForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl Forwarder for HyperForwarder {
    async fn forward(&self, request: HeldRequest) -> Result<ForwardedResponse, ForwardError> {
        let request = outbound_request(request)?;
        debug!(method = %request.method(), uri = %request.uri(), "forwarding");

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ForwardError::Transport(describe(&e)))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| ForwardError::Body(e.to_string()))?
            .to_bytes();

        Ok(ForwardedResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

fn outbound_request(held: HeldRequest) -> Result<Request<Full<Bytes>>, ForwardError> {
    if held.uri.scheme().is_none() || held.uri.authority().is_none() {
        return Err(ForwardError::InvalidRequest(format!(
            "cannot forward `{}` without an absolute URL",
            held.uri
        )));
    }
    let mut request = held.into_request();
    strip_hop_by_hop(request.headers_mut());
    let length = request.body().len();
    if length > 0 || request.headers().contains_key(header::CONTENT_LENGTH) {
        request
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    *request.version_mut() = Version::HTTP_11;
    Ok(request.map(Full::new))
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// The legacy client's own message is terse ("client error (Connect)"); append
/// the underlying cause when there is one.
fn describe(err: &hyper_util::client::legacy::Error) -> String {
    match std::error::Error::source(err) {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};
    use tokio::net::TcpListener;

    use super::*;
    use crate::testing::spawn_upstream;

    fn held(method: Method, uri: &str, body: &'static str) -> HeldRequest {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("connection", "close, x-secret")
            .header("x-secret", "hop")
            .header("proxy-connection", "keep-alive")
            .header("x-kept", "1")
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
            .into()
    }

    #[tokio::test]
    async fn test_forward_relays_request_and_response() {
        let (addr, captured) = spawn_upstream().await;
        let mut request = held(Method::POST, &format!("http://{addr}/submit?x=9&y=2"), "");
        request.replace_body("a=1");

        let response = HyperForwarder::new().forward(request).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.headers.get("x-upstream").unwrap(), "yes");
        assert_eq!(response.body, Bytes::from("ok"));

        let (head, body) = captured.await.unwrap();
        assert!(head.starts_with("post /submit?x=9&y=2 http/1.1\r\n"));
        assert!(head.contains("x-kept: 1"));
        assert!(head.contains("content-length: 3"));
        assert!(!head.contains("x-secret"));
        assert!(!head.contains("proxy-connection"));
        assert_eq!(body, b"a=1");
    }

    #[tokio::test]
    async fn test_forward_to_closed_port_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = HyperForwarder::new()
            .forward(held(Method::GET, &format!("http://{addr}/"), ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Transport(_)), "{err}");
    }

    #[tokio::test]
    async fn test_forward_rejects_relative_uri() {
        let err = HyperForwarder::new()
            .forward(held(Method::GET, "/relative", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::InvalidRequest(_)));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("x-a"));
        headers.insert("x-a", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::HOST, HeaderValue::from_static("example.com"));
        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::HOST));
    }
}
