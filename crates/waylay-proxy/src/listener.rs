use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::uri::{Authority, Scheme};
use http::{Method, Uri};
use http_body_util::{BodyExt, Full};
use hudsucker::certificate_authority::RcgenAuthority;
use hudsucker::hyper::{Request, Response};
use hudsucker::rcgen::{CertificateParams, KeyPair};
use hudsucker::{Body, HttpContext, HttpHandler, Proxy, RequestOrResponse};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use waylay_core::error::{ForwardError, ProxyError};
use waylay_core::forward::{ForwardedResponse, Forwarder};
use waylay_core::gate::InterceptGate;
use waylay_core::request::HeldRequest;

use crate::forward::strip_hop_by_hop;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8888)),
        }
    }
}

/// The HTTP proxy that feeds every inbound request through an [`InterceptGate`].
pub struct InterceptProxy<F> {
    config: ProxyConfig,
    gate: Arc<InterceptGate>,
    forwarder: Arc<F>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl<F: Forwarder + 'static> InterceptProxy<F> {
    pub fn new(config: ProxyConfig, gate: Arc<InterceptGate>, forwarder: F) -> Self {
        Self {
            config,
            gate,
            forwarder: Arc::new(forwarder),
            shutdown_tx: None,
            task_handle: None,
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.config.listen_addr
    }

    /// Bind the listen address and serve in the background.
    ///
    /// A bind failure is returned here. Binding port 0 picks a free port, which
    /// [`listen_addr`](Self::listen_addr) then reports.
    pub async fn start(&mut self) -> Result<(), ProxyError> {
        if self.task_handle.is_some() {
            return Err(ProxyError::StartFailed("proxy already running".into()));
        }
        let requested = self.config.listen_addr;
        let listener = TcpListener::bind(requested)
            .await
            .map_err(|e| ProxyError::StartFailed(format!("cannot listen on {requested}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ProxyError::StartFailed(e.to_string()))?;
        self.config.listen_addr = addr;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handler = InterceptHandler {
            gate: self.gate.clone(),
            forwarder: self.forwarder.clone(),
        };

        let task_handle = tokio::spawn(async move {
            // Required by the builder; CONNECT tunnels are never decrypted.
            let (key_pair, ca_cert) = generate_ca();
            let ca = RcgenAuthority::new(key_pair, ca_cert, 1000);

            info!("Starting proxy on {addr}");

            let proxy = Proxy::builder()
                .with_listener(listener)
                .with_rustls_client()
                .with_ca(ca)
                .with_http_handler(handler)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .build();

            if let Err(e) = proxy.start().await {
                warn!("Proxy error: {e}");
            }
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.task_handle = Some(task_handle);

        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), ProxyError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| ProxyError::StopFailed(e.to_string()))?;
            info!("proxy stopped");
        }
        Ok(())
    }
}

fn generate_ca() -> (KeyPair, hudsucker::rcgen::Certificate) {
    use hudsucker::rcgen;

    let mut params = CertificateParams::default();
    params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "Waylay Proxy CA");
    params
        .distinguished_name
        .push(rcgen::DnType::OrganizationName, "Waylay");

    let key_pair = KeyPair::generate().expect("Failed to generate CA key pair");
    let ca_cert = params
        .self_signed(&key_pair)
        .expect("Failed to self-sign CA certificate");

    (key_pair, ca_cert)
}

/// Cloned per connection by hudsucker. Each plain-HTTP request is answered
/// here directly, so hudsucker's own upstream client is never used for it.
struct InterceptHandler<F> {
    gate: Arc<InterceptGate>,
    forwarder: Arc<F>,
}

impl<F> Clone for InterceptHandler<F> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            forwarder: self.forwarder.clone(),
        }
    }
}

impl<F: Forwarder + 'static> HttpHandler for InterceptHandler<F> {
    async fn handle_request(&mut self, ctx: &HttpContext, req: Request<Body>) -> RequestOrResponse {
        if req.method() == Method::CONNECT {
            debug!(client = %ctx.client_addr, target = %req.uri(), "tunnelling");
            return RequestOrResponse::Request(req);
        }

        let response = match held_request(req).await {
            Ok(held) => match self.gate.process(held, &*self.forwarder).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(client = %ctx.client_addr, "forward failed: {e}");
                    ForwardedResponse::from_error(&e)
                }
            },
            Err(e) => {
                warn!(client = %ctx.client_addr, "unreadable request: {e}");
                ForwardedResponse::from_error(&e)
            }
        };

        RequestOrResponse::Response(into_response(response))
    }

    async fn should_intercept(&mut self, _ctx: &HttpContext, _req: &Request<Body>) -> bool {
        false
    }
}

async fn held_request(req: Request<Body>) -> Result<HeldRequest, ForwardError> {
    let uri = absolute_uri(&req)?;
    let (mut parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| ForwardError::Body(e.to_string()))?
        .to_bytes();
    parts.uri = uri;
    Ok(HeldRequest::from(Request::from_parts(parts, body)))
}

/// Proxy clients send absolute-form targets. A request addressed to the proxy
/// itself carries only a path, so rebuild the URL from the Host header.
fn absolute_uri<B>(req: &Request<B>) -> Result<Uri, ForwardError> {
    let uri = req.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(uri.clone());
    }
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ForwardError::InvalidRequest("request has no Host header".into()))?;
    let authority = Authority::try_from(host)
        .map_err(|e| ForwardError::InvalidRequest(format!("bad Host header `{host}`: {e}")))?;

    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(Scheme::HTTP);
    parts.authority = Some(authority);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some("/".parse().map_err(|_| {
            ForwardError::InvalidRequest("cannot build request path".into())
        })?);
    }
    Uri::from_parts(parts).map_err(|e| ForwardError::InvalidRequest(e.to_string()))
}

fn into_response(forwarded: ForwardedResponse) -> Response<Body> {
    let ForwardedResponse {
        status,
        mut headers,
        body,
    } = forwarded;
    strip_hop_by_hop(&mut headers);
    // An empty body may answer a HEAD or carry a bodiless status; the
    // upstream's Content-Length, or its absence, is relayed as is.
    if !body.is_empty() {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    }

    let mut response = Response::new(Body::from(Full::new(body)));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
