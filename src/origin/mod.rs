pub mod admin;
pub mod base;
pub mod cdn;
pub mod db;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::OriginError;
use crate::AppState;

/// Per-request bookkeeping: transaction id and start time, shared by the
/// structured info logs and the access log line.
#[derive(Clone, Debug)]
pub struct RequestMeta {
    pub txid: String,
    pub started: Instant,
}

impl RequestMeta {
    fn new() -> Self {
        Self {
            txid: format!("tx{}", Uuid::new_v4().simple()),
            started: Instant::now(),
        }
    }
}

/// Uniform info-log line for origin operations. Absent values log as `-`.
pub fn log_info(meta: &RequestMeta, msg: &str, container: &str, hsh: &str, account: &str) {
    info!(
        container,
        hash = hsh,
        account,
        txid = %meta.txid,
        elapsed = %format!("{:.4}", meta.started.elapsed().as_secs_f64()),
        "{msg}"
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    Db,
    Cdn,
    Admin,
    Passthrough,
}

/// Pick the handler for a request: tenant database surface by exact host,
/// public edge surface by host suffix, admin surface by path prefix,
/// everything else passes through to the backing store untouched.
fn classify(state: &AppState, host: &str, path: &str) -> Surface {
    if state.config.origin_db_hosts.iter().any(|h| h == host) {
        Surface::Db
    } else if state
        .config
        .origin_cdn_host_suffixes
        .iter()
        .any(|suffix| host.ends_with(suffix.as_str()))
    {
        Surface::Cdn
    } else if path.starts_with(&state.config.origin_prefix) {
        Surface::Admin
    } else {
        Surface::Passthrough
    }
}

/// Single entry point for every request.
pub async fn dispatch(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let meta = RequestMeta::new();

    let host = req
        .headers()
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("")
        .to_string();
    let method = req.method().clone();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());
    let client = client_addr(&req, remote_addr.as_deref());
    let referer = header_string(&req, "referer");
    let user_agent = header_string(&req, "user-agent");

    let surface = classify(&state, &host, req.uri().path());
    let result = match surface {
        Surface::Db => db::handle(&state, &meta, req).await,
        Surface::Cdn => match cdn::check_remote_allowed(&state, remote_addr.as_deref()) {
            Ok(()) => cdn::handle(&state, &meta, req).await,
            Err(e) => {
                debug!(error = %e, "origin request not allowed");
                return state.store.passthrough(req).await;
            }
        },
        Surface::Admin => admin::handle(&state, req).await,
        Surface::Passthrough => return state.store.passthrough(req).await,
    };

    match result {
        Ok(resp) => {
            if state.config.log_access_requests {
                info!(
                    client = client.as_deref().unwrap_or("-"),
                    remote_addr = remote_addr.as_deref().unwrap_or("-"),
                    time = %Utc::now().format("%d/%b/%Y/%H/%M/%S"),
                    method = %method,
                    host = %host,
                    request = %path_and_query,
                    status = resp.status().as_u16(),
                    referer = referer.as_deref().unwrap_or("-"),
                    user_agent = user_agent.as_deref().unwrap_or("-"),
                    txid = %meta.txid,
                    trans_time = %format!("{:.4}", meta.started.elapsed().as_secs_f64()),
                    "access"
                );
            }
            resp
        }
        Err(OriginError::InvalidUtf8) => {
            (StatusCode::PRECONDITION_FAILED, "Invalid UTF8").into_response()
        }
        Err(OriginError::InvalidConfiguration(msg)) => {
            error!(error = %msg, "invalid configuration");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            error!(error = %e, "origin request failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn header_string(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Best client address available: the cluster LB header, then the first
/// X-Forwarded-For entry, then the socket peer.
fn client_addr(req: &Request, remote_addr: Option<&str>) -> Option<String> {
    if let Some(client) = header_string(req, "x-cluster-client-ip") {
        return Some(client);
    }
    if let Some(forwarded) = header_string(req, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    remote_addr.map(str::to_string)
}
