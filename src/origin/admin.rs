use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::info;

use crate::error::OriginError;
use crate::path::split_path;
use crate::AppState;

/// Identity that must appear in `x-origin-admin-user`.
const ORIGIN_ADMIN_USER: &str = ".origin_admin";

fn is_origin_admin(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(admin_key) = &state.config.origin_admin_key else {
        return false;
    };
    headers
        .get("x-origin-admin-user")
        .and_then(|v| v.to_str().ok())
        == Some(ORIGIN_ADMIN_USER)
        && headers
            .get("x-origin-admin-key")
            .and_then(|v| v.to_str().ok())
            == Some(admin_key.as_str())
}

/// One-shot cluster preparation: `POST <origin_prefix>.prep` creates the
/// origin account and every `.hash_<n>` shard container. Only the origin
/// admin may call this; any other admin URI is not-found.
pub async fn handle(state: &AppState, req: Request) -> Result<Response, OriginError> {
    if !is_origin_admin(state, req.headers()) {
        return Ok(StatusCode::FORBIDDEN.into_response());
    }
    let segs = match split_path(req.uri().path(), 2, 2, false) {
        Ok(segs) => segs,
        Err(err @ OriginError::InvalidUtf8) => return Err(err),
        Err(_) => return Ok(StatusCode::BAD_REQUEST.into_response()),
    };
    if req.method() == Method::POST && segs[1].as_deref() == Some(".prep") {
        let account_path = format!("/v1/{}", state.config.origin_account);
        create_or_fail(state, &account_path).await?;
        for i in 0..state.config.number_hash_id_containers {
            let path = format!("/v1/{}/.hash_{}", state.config.origin_account, i);
            create_or_fail(state, &path).await?;
        }
        info!(
            hash_containers = state.config.number_hash_id_containers,
            "origin database prepared"
        );
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(StatusCode::NOT_FOUND.into_response())
}

async fn create_or_fail(state: &AppState, path: &str) -> Result<(), OriginError> {
    let resp = state
        .store
        .request(Method::PUT, path)
        .send()
        .await
        .map_err(|e| OriginError::DbFailure(format!("could not create {path}: {e}")))?;
    if !resp.status().is_success() {
        return Err(OriginError::DbFailure(format!(
            "could not create {path}: {}",
            resp.status()
        )));
    }
    Ok(())
}
