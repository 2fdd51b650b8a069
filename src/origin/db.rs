use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{debug, error};

use crate::cache::CachedMetadata;
use crate::config::{truthy, OriginConfig};
use crate::error::OriginError;
use crate::hashdata::HashData;
use crate::origin::base::{self, METADATA_CACHE_SECS};
use crate::origin::{log_info, RequestMeta};
use crate::path::{quote_path, split_path};
use crate::AppState;

/// Authorization hook installed by upstream identity middleware through
/// request extensions. A returned response short-circuits the request.
#[derive(Clone)]
pub struct AuthorizeHook(pub Arc<dyn Fn(&Request) -> Option<Response> + Send + Sync>);

/// Tenant-facing CRUD over container CDN metadata:
/// `GET /<vsn>/<account>` lists, `HEAD|PUT|POST|DELETE
/// /<vsn>/<account>/<container>` operate on one record.
pub async fn handle(
    state: &AppState,
    meta: &RequestMeta,
    req: Request,
) -> Result<Response, OriginError> {
    if let Some(hook) = req.extensions().get::<AuthorizeHook>().cloned() {
        if let Some(resp) = (hook.0)(&req) {
            return Ok(resp);
        }
    }

    let method = req.method().clone();
    let result = if method == Method::PUT || method == Method::POST {
        puts_posts(state, meta, req).await
    } else if method == Method::GET {
        listing(state, meta, req).await
    } else if method == Method::HEAD {
        head(state, meta, req).await
    } else if method == Method::DELETE {
        delete(state, meta, req).await
    } else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    match result {
        Err(OriginError::DbNotFound) => Ok(StatusCode::NOT_FOUND.into_response()),
        Err(OriginError::DbFailure(msg)) => {
            error!(error = %msg, "origin db failure");
            Ok((StatusCode::INTERNAL_SERVER_ERROR, "Origin DB Failure").into_response())
        }
        other => other,
    }
}

/// "True"/"False", the spelling used in headers and the packed listing
/// content type.
fn flag_str(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Single query-string accessor so every parameter is decoded the same way.
fn query_param(req: &Request, name: &str) -> Option<String> {
    let query = req.uri().query()?;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some(name) {
            let raw = parts.next().unwrap_or("");
            return urlencoding::decode(raw).ok().map(|v| v.into_owned());
        }
    }
    None
}

/// Packed listing encoding carried in the child object's Content-Type.
fn listing_content_type(cdn_enabled: bool, ttl: u64, logs_enabled: bool) -> String {
    format!(
        "x-cdn/{}-{}-{}",
        flag_str(cdn_enabled),
        ttl,
        flag_str(logs_enabled)
    )
}

/// Convert rendered CDN URLs into response headers, named by section key.
fn url_headers(
    config: &OriginConfig,
    hsh: &str,
    method: &str,
) -> Result<HeaderMap, OriginError> {
    let mut headers = HeaderMap::new();
    for (key, url) in base::cdn_urls(config, hsh, method, "")? {
        let name = HeaderName::try_from(key.as_str()).map_err(|_| {
            OriginError::InvalidConfiguration(format!("url format key {key:?} is not a header name"))
        })?;
        let value = HeaderValue::try_from(url.as_str()).map_err(|_| {
            OriginError::InvalidConfiguration(format!("url {url:?} is not a header value"))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// One rendered listing row.
enum ListingEntry {
    Text(String),
    Json(Value),
    Xml(String),
}

/// Decode one backend listing row.
///
/// Returns `Ok(None)` when an `enabled` filter drops the row. A malformed
/// row (bad content type, unparsable TTL) is an `InvalidContentType` error
/// the caller logs and skips; configuration problems propagate.
fn parse_container_listing(
    config: &OriginConfig,
    account: &str,
    row: &Value,
    output_format: Option<&str>,
    only_cdn_enabled: Option<bool>,
) -> Result<Option<ListingEntry>, OriginError> {
    let container = row
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| OriginError::InvalidContentType(format!("{account}: row without name")))?;
    let cdn_data = row
        .get("content_type")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            OriginError::InvalidContentType(format!("{account}/{container}: missing content type"))
        })?;

    let invalid = || {
        OriginError::InvalidContentType(format!(
            "Invalid Content-Type: {account}/{container}: {cdn_data}"
        ))
    };
    let packed = cdn_data.strip_prefix("x-cdn/").ok_or_else(invalid)?;
    let fields: Vec<&str> = packed.split('-').collect();
    let &[enabled_raw, ttl_raw, log_raw] = fields.as_slice() else {
        return Err(invalid());
    };
    let cdn_enabled = truthy(enabled_raw);
    let logs_enabled = truthy(log_raw);
    let ttl: u64 = ttl_raw.parse().map_err(|_| invalid())?;

    if let Some(want) = only_cdn_enabled {
        if want != cdn_enabled {
            return Ok(None);
        }
    }

    let output_format = match output_format {
        Some(f @ ("json" | "xml")) => f,
        _ => return Ok(Some(ListingEntry::Text(container.to_string()))),
    };

    let hsh = base::hash_path(config, account, container);
    let urls = base::cdn_urls(config, &hsh, "GET", output_format)?;

    if output_format == "xml" {
        let mut tags = vec![
            format!("<name>{container}</name>"),
            format!("<cdn_enabled>{}</cdn_enabled>", flag_str(cdn_enabled)),
            format!("<ttl>{ttl}</ttl>"),
            format!("<log_retention>{}</log_retention>", flag_str(logs_enabled)),
        ];
        for (key, url) in &urls {
            tags.push(format!("<{key}>{url}</{key}>"));
        }
        return Ok(Some(ListingEntry::Xml(format!(
            "  <container>\n{}\n  </container>",
            tags.join("\n")
        ))));
    }

    let mut obj = serde_json::Map::new();
    obj.insert("name".into(), Value::String(container.to_string()));
    obj.insert("cdn_enabled".into(), Value::Bool(cdn_enabled));
    obj.insert("ttl".into(), Value::from(ttl));
    obj.insert("log_retention".into(), Value::Bool(logs_enabled));
    for (key, url) in urls {
        obj.insert(key, Value::String(url));
    }
    Ok(Some(ListingEntry::Json(Value::Object(obj))))
}

/// `GET /<vsn>/<account>` — list a tenant's CDN containers from the
/// per-account listing container, filtering and re-querying as needed.
async fn listing(
    state: &AppState,
    meta: &RequestMeta,
    req: Request,
) -> Result<Response, OriginError> {
    let segs = match split_path(req.uri().path(), 2, 3, true) {
        Ok(segs) => segs,
        Err(err @ OriginError::InvalidUtf8) => return Err(err),
        Err(_) => {
            debug!(path = req.uri().path(), "invalid listing request");
            return Ok((
                StatusCode::BAD_REQUEST,
                "Invalid request. URL format: /<api version>/<account>",
            )
                .into_response());
        }
    };
    let Some(account) = segs[1].clone() else {
        return Ok((
            StatusCode::BAD_REQUEST,
            "Invalid request. URL format: /<api version>/<account>",
        )
            .into_response());
    };

    let list_format = query_param(&req, "format").map(|f| f.to_ascii_lowercase());
    let enabled_only = query_param(&req, "enabled")
        .filter(|v| !v.is_empty())
        .map(|v| truthy(&v));
    let limit = match query_param(&req, "limit").filter(|v| !v.is_empty()) {
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) => Some(n),
            Err(_) => {
                debug!(limit = %raw, "invalid listing limit");
                return Ok((StatusCode::BAD_REQUEST, "Invalid limit, must be an integer")
                    .into_response());
            }
        },
        None => None,
    };

    let mut marker = query_param(&req, "marker").unwrap_or_default();
    let mut formatted: Vec<ListingEntry> = Vec::new();
    loop {
        let listing_path = format!(
            "{}?format=json&marker={}",
            quote_path(&format!("/v1/{}/{}", state.config.origin_account, account)),
            urlencoding::encode(&marker)
        );
        // No limit on the backend request: rows may still be filtered out
        // on cdn_enabled below.
        let resp = state
            .store
            .request(Method::GET, &listing_path)
            .send()
            .await
            .map_err(|e| OriginError::DbFailure(format!("origin db listings failure: {e}")))?;
        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(OriginError::DbNotFound);
        }
        if !status.is_success() {
            return Err(OriginError::DbFailure("origin db listings failure".into()));
        }
        let rows: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| OriginError::DbFailure(format!("unparsable listing body: {e}")))?;

        for row in &rows {
            if limit.is_some_and(|l| formatted.len() >= l) {
                break;
            }
            match parse_container_listing(
                &state.config,
                &account,
                row,
                list_format.as_deref(),
                enabled_only,
            ) {
                Ok(Some(entry)) => formatted.push(entry),
                Ok(None) => {}
                Err(OriginError::InvalidContentType(msg)) => {
                    error!(error = %msg, "skipping listing row");
                }
                Err(e) => return Err(e),
            }
        }

        if !rows.is_empty() && formatted.is_empty() {
            // Every row was filtered out: re-query from the last row so
            // paging still makes progress.
            let new_marker = rows
                .last()
                .and_then(|r| r.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| OriginError::DbFailure("listing row without name".into()))?;
            if new_marker.as_str() <= marker.as_str() {
                return Err(OriginError::DbFailure(
                    "listing marker did not advance".into(),
                ));
            }
            marker = new_marker;
            continue;
        }
        break;
    }

    let (content_type, body) = match list_format.as_deref() {
        Some("xml") => {
            let entries: Vec<String> = formatted
                .into_iter()
                .filter_map(|e| match e {
                    ListingEntry::Xml(s) => Some(s),
                    _ => None,
                })
                .collect();
            (
                "application/xml",
                format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<account name=\"{}\">\n{}\n</account>",
                    account,
                    entries.join("\n")
                ),
            )
        }
        Some("json") => {
            let values: Vec<Value> = formatted
                .into_iter()
                .filter_map(|e| match e {
                    ListingEntry::Json(v) => Some(v),
                    _ => None,
                })
                .collect();
            (
                "application/json",
                serde_json::to_string(&values).unwrap_or_else(|_| "[]".to_string()),
            )
        }
        _ => {
            let names: Vec<String> = formatted
                .into_iter()
                .filter_map(|e| match e {
                    ListingEntry::Text(s) => Some(s),
                    _ => None,
                })
                .collect();
            ("text/plain; charset=UTF-8", names.join("\n") + "\n")
        }
    };

    log_info(
        meta,
        &format!("CDN container listing {}", body.len()),
        "-",
        "-",
        &account,
    );
    Ok(([("content-type", content_type)], body).into_response())
}

/// `HEAD /<vsn>/<account>/<container>` — metadata of one record, served
/// through the cache.
async fn head(
    state: &AppState,
    meta: &RequestMeta,
    req: Request,
) -> Result<Response, OriginError> {
    let segs = match split_path(req.uri().path(), 3, 3, false) {
        Ok(segs) => segs,
        Err(err @ OriginError::InvalidUtf8) => return Err(err),
        Err(_) => return Ok(StatusCode::BAD_REQUEST.into_response()),
    };
    let (Some(account), Some(container)) = (segs[1].clone(), segs[2].clone()) else {
        return Ok(StatusCode::BAD_REQUEST.into_response());
    };

    let hsh = base::hash_path(&state.config, &account, &container);
    let cdn_obj_path = base::hash_object_path(&state.config, &hsh)?;
    if let Some(data) = base::get_cdn_data(state, &cdn_obj_path).await {
        let mut headers = url_headers(&state.config, &hsh, "HEAD")?;
        headers.insert("x-ttl", HeaderValue::from(data.ttl));
        headers.insert(
            "x-log-retention",
            HeaderValue::from_static(flag_str(data.logs_enabled)),
        );
        headers.insert(
            "x-cdn-enabled",
            HeaderValue::from_static(flag_str(data.cdn_enabled)),
        );
        log_info(meta, "CDN HEAD", &container, &hsh, &account);
        return Ok((StatusCode::NO_CONTENT, headers).into_response());
    }
    Ok(StatusCode::NOT_FOUND.into_response())
}

/// `PUT|POST /<vsn>/<account>/<container>` — create or update a record.
///
/// PUT creates or replaces; POST requires the record to exist. Fields not
/// overridden by headers inherit the existing record's values, or defaults
/// on create. The hash-shard object, the cache, and the per-account listing
/// are updated in that order.
async fn puts_posts(
    state: &AppState,
    meta: &RequestMeta,
    req: Request,
) -> Result<Response, OriginError> {
    let segs = match split_path(req.uri().path(), 3, 3, false) {
        Ok(segs) => segs,
        Err(err @ OriginError::InvalidUtf8) => return Err(err),
        Err(_) => return Ok(StatusCode::BAD_REQUEST.into_response()),
    };
    let (Some(account), Some(container)) = (segs[1].clone(), segs[2].clone()) else {
        return Ok(StatusCode::BAD_REQUEST.into_response());
    };

    let hsh = base::hash_path(&state.config, &account, &container);
    let cdn_obj_path = base::hash_object_path(&state.config, &hsh)?;

    let mut ttl = state.config.default_ttl;
    let mut cdn_enabled = true;
    let mut logs_enabled = false;
    match base::get_cdn_data(state, &cdn_obj_path).await {
        Some(existing) => {
            ttl = existing.ttl;
            cdn_enabled = existing.cdn_enabled;
            logs_enabled = existing.logs_enabled;
        }
        None if req.method() == Method::POST => {
            return Ok(StatusCode::NOT_FOUND.into_response());
        }
        None => {}
    }

    let ttl_header = header_str(req.headers(), "x-ttl").map(str::to_string);
    if let Some(raw) = &ttl_header {
        ttl = match raw.trim().parse::<u64>() {
            Ok(v) => v,
            Err(_) => {
                return Ok(
                    (StatusCode::BAD_REQUEST, "Invalid X-TTL, must be an integer").into_response(),
                )
            }
        };
    }
    if ttl < state.config.min_ttl || ttl > state.config.max_ttl {
        return Ok((
            StatusCode::BAD_REQUEST,
            format!(
                "Invalid X-TTL, must be between {} and {}",
                state.config.min_ttl, state.config.max_ttl
            ),
        )
            .into_response());
    }

    let mut log_msg = Vec::new();
    if let Some(raw) = header_str(req.headers(), "x-log-retention") {
        logs_enabled = truthy(raw);
        log_msg.push(format!("X-Log-Retention: {}", flag_str(logs_enabled)));
    }
    if let Some(raw) = header_str(req.headers(), "x-cdn-enabled") {
        cdn_enabled = truthy(raw);
        log_msg.push(format!("X-CDN-Enabled: {}", flag_str(cdn_enabled)));
    }
    if ttl_header.is_some() {
        log_msg.push(format!("X-TTL: {ttl}"));
    }
    if !log_msg.is_empty() {
        log_info(
            meta,
            &format!("Set CDN metadata [{}]", log_msg.join(", ")),
            &container,
            &hsh,
            &account,
        );
    }

    let new_data = HashData::new(account.clone(), container.clone(), ttl, cdn_enabled, logs_enabled);
    let cdn_obj_data = new_data.to_json();
    let cdn_obj_etag = format!("{:x}", md5::compute(cdn_obj_data.as_bytes()));
    if cdn_enabled {
        log_info(meta, "CDN enable", &container, &hsh, &account);
    }

    // The metadata object is always PUT, even for POST requests: the whole
    // record is rewritten.
    let obj_resp = state
        .store
        .request(Method::PUT, &cdn_obj_path)
        .header("etag", cdn_obj_etag.as_str())
        .body(cdn_obj_data.clone())
        .send()
        .await
        .map_err(|e| {
            OriginError::DbFailure(format!("could not PUT .hash obj in origin db: {e}"))
        })?;
    if !obj_resp.status().is_success() {
        return Err(OriginError::DbFailure(format!(
            "could not PUT .hash obj in origin db: {} {}",
            cdn_obj_path,
            obj_resp.status()
        )));
    }

    state
        .cache
        .set(
            &base::cache_key(&state.config, &cdn_obj_path),
            CachedMetadata::Record(cdn_obj_data),
            Duration::from_secs(METADATA_CACHE_SECS),
        )
        .await;

    let listing_cont_path = quote_path(&format!(
        "/v1/{}/{}",
        state.config.origin_account, account
    ));
    let head_resp = state
        .store
        .request(Method::HEAD, &listing_cont_path)
        .send()
        .await
        .map_err(|e| OriginError::DbFailure(format!("could not check listing container: {e}")))?;
    if head_resp.status().as_u16() == 404 {
        let create_resp = state
            .store
            .request(Method::PUT, &listing_cont_path)
            .send()
            .await
            .map_err(|e| {
                OriginError::DbFailure(format!("could not create listing container: {e}"))
            })?;
        if !create_resp.status().is_success() {
            return Err(OriginError::DbFailure(format!(
                "could not create listing container in origin db: {} {}",
                listing_cont_path,
                create_resp.status()
            )));
        }
    }

    let cdn_list_path = quote_path(&format!(
        "/v1/{}/{}/{}",
        state.config.origin_account, account, container
    ));
    let list_resp = state
        .store
        .request(req.method().clone(), &cdn_list_path)
        .header(
            "content-type",
            listing_content_type(cdn_enabled, ttl, logs_enabled),
        )
        .header("content-length", "0")
        .body("")
        .send()
        .await
        .map_err(|e| OriginError::DbFailure(format!("could not update cdn listing: {e}")))?;
    if !list_resp.status().is_success() {
        return Err(OriginError::DbFailure(format!(
            "could not PUT/POST to cdn listing in origin db: {} {}",
            cdn_list_path,
            list_resp.status()
        )));
    }

    let headers = url_headers(&state.config, &hsh, "HEAD")?;
    if req.method() == Method::POST {
        Ok((StatusCode::ACCEPTED, headers).into_response())
    } else {
        Ok((StatusCode::CREATED, headers).into_response())
    }
}

/// `DELETE /<vsn>/<account>/<container>` — remove a record and its listing
/// child. A 404 from either backend delete is tolerated; both missing means
/// the record never existed.
async fn delete(
    state: &AppState,
    meta: &RequestMeta,
    req: Request,
) -> Result<Response, OriginError> {
    if !state.config.delete_enabled {
        debug!("DELETE called but not enabled");
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    let segs = match split_path(req.uri().path(), 3, 3, false) {
        Ok(segs) => segs,
        Err(err @ OriginError::InvalidUtf8) => return Err(err),
        Err(_) => {
            debug!("invalid DELETE request");
            return Ok((
                StatusCode::BAD_REQUEST,
                "Invalid request. URI format: /<api version>/<account>/<container>",
            )
                .into_response());
        }
    };
    let (Some(account), Some(container)) = (segs[1].clone(), segs[2].clone()) else {
        return Ok(StatusCode::BAD_REQUEST.into_response());
    };

    let hsh = base::hash_path(&state.config, &account, &container);
    let cdn_obj_path = base::hash_object_path(&state.config, &hsh)?;

    // Invalidate before touching the backend so a racing read cannot
    // resurrect the old record from this front end's cache.
    state
        .cache
        .delete(&base::cache_key(&state.config, &cdn_obj_path))
        .await;

    let obj_resp = state
        .store
        .request(Method::DELETE, &cdn_obj_path)
        .send()
        .await
        .map_err(|e| OriginError::DbFailure(format!("could not DELETE .hash obj: {e}")))?;
    let obj_status = obj_resp.status().as_u16();
    if !(200..300).contains(&obj_status) && obj_status != 404 {
        return Err(OriginError::DbFailure(format!(
            "could not DELETE .hash obj in origin db: {cdn_obj_path} {obj_status}"
        )));
    }

    let cdn_list_path = quote_path(&format!(
        "/v1/{}/{}/{}",
        state.config.origin_account, account, container
    ));
    let list_resp = state
        .store
        .request(Method::DELETE, &cdn_list_path)
        .send()
        .await
        .map_err(|e| OriginError::DbFailure(format!("could not DELETE listing path: {e}")))?;
    let list_status = list_resp.status().as_u16();
    if !(200..300).contains(&list_status) && list_status != 404 {
        return Err(OriginError::DbFailure(format!(
            "could not DELETE listing path in origin db: {cdn_list_path} {list_status}"
        )));
    }

    if obj_status == 404 && list_status == 404 {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }
    log_info(meta, "CDN delete", &container, &hsh, &account);
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::base_config;
    use std::collections::BTreeMap;

    fn cfg() -> OriginConfig {
        let mut cfg = base_config();
        cfg.outgoing_url_formats.insert(
            "outgoing_url_format".into(),
            BTreeMap::from([(
                "X-CDN-URI".to_string(),
                "http://{hash}.cdn.example.com".to_string(),
            )]),
        );
        cfg
    }

    fn row(name: &str, content_type: &str) -> Value {
        serde_json::json!({
            "name": name,
            "content_type": content_type,
            "bytes": 0,
            "last_modified": "2012-01-01T00:00:00"
        })
    }

    // -----------------------------------------------------------------------
    // packed content type
    // -----------------------------------------------------------------------

    #[test]
    fn listing_content_type_packs_all_three_fields() {
        assert_eq!(listing_content_type(true, 3600, false), "x-cdn/True-3600-False");
        assert_eq!(listing_content_type(false, 900, true), "x-cdn/False-900-True");
    }

    #[test]
    fn packed_content_type_round_trips_through_row_parse() {
        let packed = listing_content_type(true, 1234, true);
        let parsed =
            parse_container_listing(&cfg(), "acct", &row("cont", &packed), Some("json"), None)
                .unwrap()
                .unwrap();
        let ListingEntry::Json(value) = parsed else {
            panic!("expected json entry");
        };
        assert_eq!(value["cdn_enabled"], Value::Bool(true));
        assert_eq!(value["ttl"], Value::from(1234u64));
        assert_eq!(value["log_retention"], Value::Bool(true));
    }

    // -----------------------------------------------------------------------
    // row parsing
    // -----------------------------------------------------------------------

    #[test]
    fn text_format_returns_bare_name() {
        let parsed =
            parse_container_listing(&cfg(), "acct", &row("cont", "x-cdn/True-60-False"), None, None)
                .unwrap()
                .unwrap();
        assert!(matches!(parsed, ListingEntry::Text(name) if name == "cont"));
    }

    #[test]
    fn json_format_includes_cdn_urls() {
        let parsed = parse_container_listing(
            &cfg(),
            "acct",
            &row("cont", "x-cdn/True-60-False"),
            Some("json"),
            None,
        )
        .unwrap()
        .unwrap();
        let ListingEntry::Json(value) = parsed else {
            panic!("expected json entry");
        };
        let url = value["X-CDN-URI"].as_str().unwrap();
        assert!(url.starts_with("http://"));
        assert!(url.ends_with(".cdn.example.com"));
    }

    #[test]
    fn xml_format_wraps_container_element() {
        let parsed = parse_container_listing(
            &cfg(),
            "acct",
            &row("cont", "x-cdn/True-60-False"),
            Some("xml"),
            None,
        )
        .unwrap()
        .unwrap();
        let ListingEntry::Xml(xml) = parsed else {
            panic!("expected xml entry");
        };
        assert!(xml.contains("<container>"));
        assert!(xml.contains("<name>cont</name>"));
        assert!(xml.contains("<cdn_enabled>True</cdn_enabled>"));
    }

    #[test]
    fn enabled_filter_drops_mismatched_rows() {
        let parsed = parse_container_listing(
            &cfg(),
            "acct",
            &row("cont", "x-cdn/False-60-False"),
            None,
            Some(true),
        )
        .unwrap();
        assert!(parsed.is_none());
        let kept = parse_container_listing(
            &cfg(),
            "acct",
            &row("cont", "x-cdn/False-60-False"),
            None,
            Some(false),
        )
        .unwrap();
        assert!(kept.is_some());
    }

    #[test]
    fn wrong_prefix_is_invalid() {
        assert!(matches!(
            parse_container_listing(&cfg(), "acct", &row("cont", "text/plain"), None, None),
            Err(OriginError::InvalidContentType(_))
        ));
    }

    #[test]
    fn non_integer_ttl_is_invalid() {
        assert!(matches!(
            parse_container_listing(&cfg(), "acct", &row("cont", "x-cdn/True-soon-False"), None, None),
            Err(OriginError::InvalidContentType(_))
        ));
    }

    #[test]
    fn extra_field_is_invalid() {
        assert!(matches!(
            parse_container_listing(
                &cfg(),
                "acct",
                &row("cont", "x-cdn/True-60-False-Extra"),
                None,
                None
            ),
            Err(OriginError::InvalidContentType(_))
        ));
    }

    #[test]
    fn row_without_content_type_is_invalid() {
        let row = serde_json::json!({ "name": "cont" });
        assert!(matches!(
            parse_container_listing(&cfg(), "acct", &row, None, None),
            Err(OriginError::InvalidContentType(_))
        ));
    }
}
