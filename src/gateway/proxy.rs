use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::response::Response;
use tracing::{debug, warn};

use super::pool::TargetPool;
use crate::analytics;
use crate::errors::GatewayError;
use crate::sessions::{SessionManager, SessionState};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Carries the caller's public profile (JSON) to backends.
pub const IDENTITY_HEADER: HeaderName = HeaderName::from_static("x-user");

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

// -----------------------------------------------------------------------------
// ----- Dispatcher ------------------------------------------------------------

/// Forwards one route's traffic to its target pool, tagging each request with
/// the caller's identity when there is a valid session.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<TargetPool>,
    sessions: SessionManager,
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(pool: Arc<TargetPool>, sessions: SessionManager, client: reqwest::Client) -> Self {
        Self {
            pool,
            sessions,
            client,
        }
    }

    pub fn pool(&self) -> &Arc<TargetPool> {
        &self.pool
    }
}

// -----------------------------------------------------------------------------
// ----- Dispatcher: Public ----------------------------------------------------

impl Dispatcher {
    pub async fn dispatch(&self, req: Request) -> Result<Response, GatewayError> {
        let (mut parts, body) = req.into_parts();

        // Never trust an identity the client made up.
        parts.headers.remove(IDENTITY_HEADER);

        match self
            .sessions
            .load_state::<SessionState>(&parts.headers, &parts.uri)
            .await
        {
            Ok((_, state)) => {
                let profile = serde_json::to_vec(&state.user)
                    .map_err(|e| GatewayError::Internal(format!("x-user encoding: {e}")))?;
                let value = HeaderValue::from_bytes(&profile)
                    .map_err(|e| GatewayError::Internal(format!("x-user header: {e}")))?;
                parts.headers.insert(IDENTITY_HEADER, value);
            }
            Err(e) => debug!(route = self.pool.name(), "forwarding anonymously: {e}"),
        }

        let target = self.pool.next();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{target}{path_and_query}");

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        if let Some(ip) = peer {
            append_forwarded_for(&mut headers, &ip.to_string());
        }

        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| GatewayError::BadRequest(format!("failed to read request body: {e}")))?;

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                analytics::inc_upstream_failure();
                warn!(route = self.pool.name(), %target, "upstream request failed: {e}");
                GatewayError::ProxyUpstreamUnreachable {
                    target: target.to_string(),
                    reason: e.to_string(),
                }
            })?;

        analytics::inc_proxied();
        debug!(route = self.pool.name(), %target, status = %upstream.status(), "proxied");

        let mut response = Response::builder().status(upstream.status());
        if let Some(out) = response.headers_mut() {
            *out = upstream.headers().clone();
            strip_hop_by_hop(out);
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| GatewayError::Internal(format!("failed to build response: {e}")))
    }
}

/// Axum handler for every proxied path of one route.
pub async fn forward(
    State(dispatcher): State<Dispatcher>,
    req: Request,
) -> Result<Response, GatewayError> {
    dispatcher.dispatch(req).await
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are hop-by-hop too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.trim().is_empty() => format!("{prior}, {ip}"),
        _ => ip.to_string(),
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hop_by_hop_and_connection_named_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-trace", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn forwarded_for_appends() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1");
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.1");

        append_forwarded_for(&mut headers, "10.0.0.2");
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.1, 10.0.0.2");
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
