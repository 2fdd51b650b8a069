use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::{debug, error, warn};

use crate::error::OriginError;
use crate::origin::base::{self, BAD_URL_CACHE_SECS, NEGATIVE_CACHE_SECS};
use crate::origin::{log_info, RequestMeta};
use crate::path::quote_path;
use crate::store;
use crate::AppState;

/// Hash and object name resolved by earlier middleware; honored when set so
/// a fronting rewrite layer can bypass the regex extraction.
#[derive(Clone, Debug, Default)]
pub struct CdnTarget {
    pub hash: Option<String>,
    pub object_name: Option<String>,
}

/// Request headers forwarded to the backing store.
const FORWARD_HEADERS: &[&str] = &["if-modified-since", "if-match", "range", "if-range"];

/// Backend response headers passed back to the edge.
const RESPONSE_HEADERS: &[&str] = &[
    "content-range",
    "content-encoding",
    "content-disposition",
    "accept-ranges",
    "content-type",
];

/// `Expires`/`Cache-Control` pair telling the edge how long a response may
/// be held.
fn cache_headers(ttl: u64) -> HeaderMap {
    let expires = Utc::now() + chrono::Duration::seconds(ttl as i64);
    let mut headers = HeaderMap::new();
    headers.insert(
        "expires",
        HeaderValue::from_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
            .expect("formatted date is a valid header value"),
    );
    headers.insert(
        "cache-control",
        HeaderValue::from_str(&format!("max-age:{ttl}, public"))
            .expect("cache directive is a valid header value"),
    );
    headers
}

/// Reject remote addresses outside the configured allowlist. The caller
/// treats the error as "not ours" and falls through to the wrapped
/// application.
pub fn check_remote_allowed(state: &AppState, remote_addr: Option<&str>) -> Result<(), OriginError> {
    if state.config.allowed_origin_remote_ips.is_empty() {
        return Ok(());
    }
    match remote_addr {
        Some(ip)
            if state
                .config
                .allowed_origin_remote_ips
                .iter()
                .any(|allowed| allowed == ip) =>
        {
            Ok(())
        }
        _ => Err(OriginError::NotAllowed(format!(
            "remote IP {} not allowed",
            remote_addr.unwrap_or("-")
        ))),
    }
}

/// Full request URL as the incoming regexes see it. The server sits behind
/// the TLS terminator, so the scheme is always http here.
fn request_url(req: &Request) -> String {
    let host = req
        .headers()
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("http://{host}{path_and_query}")
}

/// Public edge path: resolve the container key from the URL, look up its
/// metadata, and proxy the object out of the backing store with
/// edge-appropriate cache headers.
pub async fn handle(
    state: &AppState,
    meta: &RequestMeta,
    req: Request,
) -> Result<Response, OriginError> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return Ok(
            (StatusCode::METHOD_NOT_ALLOWED, cache_headers(BAD_URL_CACHE_SECS)).into_response(),
        );
    }

    let target = req.extensions().get::<CdnTarget>().cloned().unwrap_or_default();
    let mut hsh = target.hash;
    let mut object_name = target.object_name;
    if hsh.is_none() || object_name.is_none() {
        let url = request_url(&req);
        for (_, regex) in &state.config.incoming_url_patterns {
            if let Some(caps) = regex.captures(&url) {
                if hsh.is_none() {
                    hsh = caps.name("hash").map(|m| m.as_str().to_string());
                }
                if object_name.is_none() {
                    object_name = caps.name("object_name").map(|m| m.as_str().to_string());
                }
                break;
            }
        }
    }

    let Some(mut hsh) = hsh else {
        debug!(url = %request_url(&req), "no container key found in edge url");
        return Ok((StatusCode::NOT_FOUND, cache_headers(BAD_URL_CACHE_SECS)).into_response());
    };
    // A signed hostname prefixes the key with an HMAC token; drop it.
    if let Some((_, rest)) = hsh.split_once('-') {
        hsh = rest.to_string();
    }

    let cdn_obj_path = match base::hash_object_path(&state.config, &hsh) {
        Ok(path) => path,
        Err(e) => {
            debug!(error = %e, "invalid container key in edge url");
            return Ok((StatusCode::BAD_REQUEST, cache_headers(BAD_URL_CACHE_SECS)).into_response());
        }
    };

    let hash_data = base::get_cdn_data(state, &cdn_obj_path).await;
    let Some(hash_data) = hash_data.filter(|d| d.cdn_enabled) else {
        return Ok((StatusCode::NOT_FOUND, cache_headers(NEGATIVE_CACHE_SECS)).into_response());
    };

    let mut object_path = quote_path(&format!(
        "/v1/{}/{}/",
        hash_data.account, hash_data.container
    ));
    if let Some(name) = &object_name {
        object_path.push_str(name);
    }

    debug!(source = "SOS", path = %object_path, "forwarding edge request");
    let mut backend = state
        .store
        .request(req.method().clone(), &object_path)
        .header("x-web-mode", "True")
        .header("user-agent", "SOS Origin");
    for name in FORWARD_HEADERS {
        if let Some(value) = req.headers().get(*name) {
            backend = backend.header(*name, value);
        }
    }
    let resp = match backend.send().await {
        Ok(resp) => resp,
        Err(e) => {
            error!(path = %object_path, error = %e, "edge backend request failed");
            return Ok((StatusCode::NOT_FOUND, cache_headers(NEGATIVE_CACHE_SECS)).into_response());
        }
    };

    let status = resp.status().as_u16();
    match status {
        301 if resp.headers().contains_key("location") => {
            let mut headers = cache_headers(hash_data.ttl);
            if let Some(location) = resp.headers().get("location") {
                headers.insert("location", location.clone());
            }
            Ok((StatusCode::MOVED_PERMANENTLY, headers).into_response())
        }
        304 => Ok((StatusCode::NOT_MODIFIED, cache_headers(hash_data.ttl)).into_response()),
        416 => Ok(
            (StatusCode::RANGE_NOT_SATISFIABLE, cache_headers(NEGATIVE_CACHE_SECS)).into_response(),
        ),
        200 | 206 => {
            let content_length: Option<u64> = resp
                .headers()
                .get("content-length")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            if content_length.is_some_and(|len| len > state.config.max_cdn_file_size) {
                // Too large to serve through the edge; the backend response
                // is dropped without streaming a byte.
                return Ok(
                    (StatusCode::BAD_REQUEST, cache_headers(NEGATIVE_CACHE_SECS)).into_response(),
                );
            }

            let mut headers = HeaderMap::new();
            for &name in RESPONSE_HEADERS {
                if let Some(value) = resp.headers().get(name) {
                    headers.insert(axum::http::HeaderName::from_static(name), value.clone());
                }
            }
            for name in ["etag", "last-modified", "content-length"] {
                if let Some(value) = resp.headers().get(name) {
                    headers.insert(axum::http::HeaderName::from_static(name), value.clone());
                }
            }
            headers.extend(cache_headers(hash_data.ttl));

            log_info(
                meta,
                &format!(
                    "Public CDN request {} {}",
                    object_path,
                    content_length.map_or_else(|| "-".to_string(), |len| len.to_string())
                ),
                "-",
                &hsh,
                &hash_data.account,
            );

            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            let mut response = Response::new(store::stream_body(resp));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            Ok(response)
        }
        _ => {
            warn!(hash = %hsh, status, "public CDN request not served");
            if status != 404 {
                error!(status, path = %cdn_obj_path, "unexpected response from storage backend");
            }
            Ok((StatusCode::NOT_FOUND, cache_headers(NEGATIVE_CACHE_SECS)).into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_control_carries_ttl() {
        let headers = cache_headers(30);
        assert_eq!(headers["cache-control"], "max-age:30, public");
        let expires = headers["expires"].to_str().unwrap();
        assert!(expires.ends_with(" GMT"), "unexpected Expires: {expires}");
    }

    #[test]
    fn expires_is_in_the_future() {
        let headers = cache_headers(86_400);
        let expires = headers["expires"].to_str().unwrap();
        let parsed =
            chrono::NaiveDateTime::parse_from_str(expires, "%a, %d %b %Y %H:%M:%S GMT").unwrap();
        assert!(parsed.and_utc() > Utc::now());
    }
}
