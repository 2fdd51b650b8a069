use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::error;

/// User agent stamped on every authenticated sub-request.
const SUB_REQUEST_AGENT: &str = "cdn-origin";

/// Hop-by-hop headers that must not be forwarded (RFC 2616 §13.5.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// HTTP client for the backing object-storage cluster.
///
/// Every request built here carries the cluster-admin identity, so callers
/// get the "authenticated sub-request" primitive: handlers decide what to
/// ask for, this client decides how to be allowed to ask.
///
/// Cloning is cheap — clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct StoreClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl StoreClient {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Self {
        // Redirects are surfaced to callers, not followed: the edge handler
        // shapes 301s itself and pass-through must stay verbatim. The agent
        // is a default so callers can still override it per request.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(SUB_REQUEST_AGENT)
            .build()
            .expect("http client construction");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    /// Build an authenticated request against the cluster.
    /// `path_and_query` must already be percent-encoded.
    pub fn request(&self, method: Method, path_and_query: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path_and_query);
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.auth_token {
            builder = builder.header("x-auth-token", token);
        }
        builder
    }

    /// Forward an unmatched request to the cluster verbatim and stream the
    /// response back. Hop-by-hop headers are stripped in both directions.
    pub async fn passthrough(&self, req: Request) -> Response {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();
        let (parts, body) = req.into_parts();

        let url = format!("{}{}", self.base_url, path_and_query);
        let mut builder = self.client.request(parts.method, url);
        for (name, value) in parts.headers.iter() {
            let lower = name.as_str();
            if lower == "host" || HOP_BY_HOP.contains(&lower) {
                continue;
            }
            builder = builder.header(name, value);
        }
        builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));

        match builder.send().await {
            Ok(resp) => {
                let status = resp.status();
                let mut headers = HeaderMap::new();
                for (name, value) in resp.headers().iter() {
                    if !HOP_BY_HOP.contains(&name.as_str()) {
                        headers.insert(name, value.clone());
                    }
                }
                let mut response = Response::builder()
                    .status(status)
                    .body(stream_body(resp))
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
                *response.headers_mut() = headers;
                response
            }
            Err(e) => {
                error!(error = %e, "storage cluster unavailable");
                (StatusCode::BAD_GATEWAY, "storage backend unavailable").into_response()
            }
        }
    }
}

/// Wrap a backend response body as a streaming axum body. Dropping the
/// returned body aborts the transfer and releases the backend connection.
pub fn stream_body(resp: reqwest::Response) -> Body {
    let stream = resp.bytes_stream().map(|chunk| {
        chunk.map_err(|e| {
            error!(error = %e, "error streaming from storage backend");
            std::io::Error::other(e)
        })
    });
    Body::from_stream(stream)
}
