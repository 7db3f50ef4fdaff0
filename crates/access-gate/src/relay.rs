//! Forwards admitted requests to the protected upstream site.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::header::{self, HeaderMap};
use http::StatusCode;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Largest request body relayed upstream.
pub const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

/// Upstream origin requests are relayed to.
#[derive(Clone, Debug)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: Arc<str>,
}

impl Upstream {
    /// `base_url` is scheme + authority (+ optional path prefix), e.g.
    /// `http://127.0.0.1:5000`.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, req: &Request) -> String {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}{}", self.base_url, path_and_query)
    }
}

/// Fallback handler relaying the request upstream and streaming the
/// response back. Upstream failures become `502 Bad Gateway`.
pub async fn forward(State(upstream): State<Upstream>, req: Request) -> Response {
    let url = upstream.url_for(&req);
    let (parts, body) = req.into_parts();

    let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(%url, %err, "failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
        }
    };

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    let result = upstream
        .client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await;

    let resp = match result {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!(%url, %err, "upstream request failed");
            return (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response();
        }
    };

    let status = resp.status();
    let mut headers = resp.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(resp.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Remove the fixed hop-by-hop set plus every header named in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    for name in listed.iter().map(String::as_str).chain(HOP_BY_HOP.iter().copied()) {
        headers.remove(name);
    }
}
