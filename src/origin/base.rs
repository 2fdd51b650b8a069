use std::collections::BTreeMap;
use std::time::Duration;

use axum::http::{Method, Uri};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::warn;

use crate::cache::CachedMetadata;
use crate::config::OriginConfig;
use crate::error::OriginError;
use crate::hashdata::HashData;
use crate::AppState;

/// Cache lifetime attached to responses for URLs that will never resolve.
pub const BAD_URL_CACHE_SECS: u64 = 86_400;

/// Negative-cache lifetime. Kept short so a container created moments ago
/// becomes visible without explicit invalidation.
pub const NEGATIVE_CACHE_SECS: u64 = 30;

/// Positive metadata cache lifetime.
pub const METADATA_CACHE_SECS: u64 = 3_600;

type HmacSha1 = Hmac<Sha1>;

/// Compute the container key: hex MD5 of `/<account>/<container>/<suffix>`.
/// With a fixed suffix this is a pure function of the two names, so every
/// front end places a container's metadata at the same spot.
pub fn hash_path(config: &OriginConfig, account: &str, container: &str) -> String {
    let digest = md5::compute(format!(
        "/{}/{}/{}",
        account, container, config.hash_path_suffix
    ));
    format!("{digest:x}")
}

/// Reduce a hex container key modulo `modulus`, a digit at a time so key
/// length is unbounded.
fn hex_mod(hsh: &str, modulus: u64) -> Result<u64, OriginError> {
    if hsh.is_empty() {
        return Err(OriginError::InvalidHash(hsh.to_string()));
    }
    let mut acc: u64 = 0;
    for c in hsh.chars() {
        let digit = c
            .to_digit(16)
            .ok_or_else(|| OriginError::InvalidHash(hsh.to_string()))?;
        acc = ((acc as u128 * 16 + digit as u128) % modulus as u128) as u64;
    }
    Ok(acc)
}

/// Path of the metadata object for a container key: the key selects one of
/// the `.hash_<n>` shard containers in the origin account.
pub fn hash_object_path(config: &OriginConfig, hsh: &str) -> Result<String, OriginError> {
    let shard = hex_mod(hsh, config.number_hash_id_containers)?;
    Ok(format!(
        "/v1/{}/.hash_{}/{}",
        config.origin_account, shard, hsh
    ))
}

/// Cache key for a metadata object path.
pub fn cache_key(config: &OriginConfig, cdn_obj_path: &str) -> String {
    format!("{}/{}", config.origin_account, cdn_obj_path)
}

/// Read-through metadata lookup.
///
/// Consults the cache first: a negative marker short-circuits to "absent",
/// a cached record is parsed (an unparsable one counts as a miss). On a
/// miss the metadata object is fetched from the origin database; a 2xx body
/// that parses is cached for an hour, a 404 plants the short negative
/// marker, anything else is treated as absent without touching the cache.
pub async fn get_cdn_data(state: &AppState, cdn_obj_path: &str) -> Option<HashData> {
    let key = cache_key(&state.config, cdn_obj_path);
    match state.cache.get(&key).await {
        Some(CachedMetadata::Negative) => return None,
        Some(CachedMetadata::Record(raw)) => {
            if let Ok(data) = HashData::from_json(raw.as_bytes()) {
                return Some(data);
            }
        }
        None => {}
    }

    let resp = match state.store.request(Method::GET, cdn_obj_path).send().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(path = cdn_obj_path, error = %e, "metadata fetch failed");
            return None;
        }
    };
    let status = resp.status();
    if status.is_success() {
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(path = cdn_obj_path, error = %e, "metadata body read failed");
                return None;
            }
        };
        match HashData::from_json(body.as_bytes()) {
            Ok(data) => {
                state
                    .cache
                    .set(
                        &key,
                        CachedMetadata::Record(body),
                        Duration::from_secs(METADATA_CACHE_SECS),
                    )
                    .await;
                return Some(data);
            }
            Err(_) => {
                warn!(path = cdn_obj_path, "invalid metadata json");
                return None;
            }
        }
    }
    if status.as_u16() == 404 {
        state
            .cache
            .set(
                &key,
                CachedMetadata::Negative,
                Duration::from_secs(NEGATIVE_CACHE_SECS),
            )
            .await;
    }
    None
}

/// Render the outgoing CDN URLs for a container key.
///
/// `request_format_tag` selects a per-listing-format section when one is
/// configured (`json`, `xml`, or empty).
pub fn cdn_urls(
    config: &OriginConfig,
    hsh: &str,
    method: &str,
    request_format_tag: &str,
) -> Result<BTreeMap<String, String>, OriginError> {
    let section = config.format_section(method, request_format_tag).ok_or_else(|| {
        OriginError::InvalidConfiguration(format!(
            "could not find url format for: {method}, {request_format_tag:?}"
        ))
    })?;
    let hash_mod = hex_mod(hsh, config.number_dns_shards)?;

    let mut urls = BTreeMap::new();
    for (key, template) in section {
        let rendered = template
            .replace("{hash}", hsh)
            .replace("{hash_mod}", &hash_mod.to_string());
        urls.insert(key.clone(), rendered.trim_end_matches('/').to_string());
    }
    if let Some(secret) = &config.hmac_signed_url_secret {
        for url in urls.values_mut() {
            *url = sign_host(secret, config.hmac_token_length, url)?;
        }
    }
    Ok(urls)
}

/// Rewrite a rendered URL so its host carries the HMAC token prefix. Only
/// scheme and host survive the rewrite.
fn sign_host(secret: &str, token_length: usize, url: &str) -> Result<String, OriginError> {
    let uri: Uri = url.parse().map_err(|_| {
        OriginError::InvalidConfiguration(format!("unparsable outgoing url {url:?}"))
    })?;
    let scheme = uri.scheme_str().unwrap_or("http");
    let host = uri.host().ok_or_else(|| {
        OriginError::InvalidConfiguration(format!("outgoing url {url:?} has no host"))
    })?;

    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(host.as_bytes());
    let token = hex::encode(mac.finalize().into_bytes());
    let token = &token[..token_length.min(token.len())];
    Ok(format!("{scheme}://{token}-{host}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::base_config;
    use std::collections::BTreeMap;

    // -----------------------------------------------------------------------
    // hashing and shard placement
    // -----------------------------------------------------------------------

    #[test]
    fn hash_path_matches_known_digest() {
        let cfg = OriginConfig {
            hash_path_suffix: "s".into(),
            ..base_config()
        };
        assert_eq!(
            hash_path(&cfg, "acct", "cont"),
            "8f88401087397546171c9871a3a1089e"
        );
    }

    #[test]
    fn hash_path_is_deterministic() {
        let cfg = base_config();
        assert_eq!(hash_path(&cfg, "a", "c"), hash_path(&cfg, "a", "c"));
    }

    #[test]
    fn hash_path_depends_on_suffix() {
        let cfg1 = OriginConfig {
            hash_path_suffix: "one".into(),
            ..base_config()
        };
        let cfg2 = OriginConfig {
            hash_path_suffix: "two".into(),
            ..base_config()
        };
        assert_ne!(hash_path(&cfg1, "a", "c"), hash_path(&cfg2, "a", "c"));
    }

    #[test]
    fn hash_object_path_places_key_in_shard() {
        let cfg = OriginConfig {
            hash_path_suffix: "s".into(),
            ..base_config()
        };
        // int("8f88401087397546171c9871a3a1089e", 16) % 100 == 74
        assert_eq!(
            hash_object_path(&cfg, "8f88401087397546171c9871a3a1089e").unwrap(),
            "/v1/.origin/.hash_74/8f88401087397546171c9871a3a1089e"
        );
    }

    #[test]
    fn shard_index_always_within_bounds() {
        let cfg = OriginConfig {
            number_hash_id_containers: 7,
            ..base_config()
        };
        for (account, container) in [("a", "b"), ("x", "y"), ("acct", "cont"), ("\u{00e9}", "c")] {
            let hsh = hash_path(&cfg, account, container);
            let path = hash_object_path(&cfg, &hsh).unwrap();
            let shard: u64 = path
                .split(".hash_")
                .nth(1)
                .unwrap()
                .split('/')
                .next()
                .unwrap()
                .parse()
                .unwrap();
            assert!(shard < 7, "shard {shard} out of range for {path}");
        }
    }

    #[test]
    fn non_hex_key_is_rejected() {
        let cfg = base_config();
        assert!(matches!(
            hash_object_path(&cfg, "not-hex"),
            Err(OriginError::InvalidHash(_))
        ));
        assert!(matches!(
            hash_object_path(&cfg, ""),
            Err(OriginError::InvalidHash(_))
        ));
    }

    #[test]
    fn cache_key_scopes_by_origin_account() {
        let cfg = base_config();
        assert_eq!(
            cache_key(&cfg, "/v1/.origin/.hash_0/abc"),
            ".origin//v1/.origin/.hash_0/abc"
        );
    }

    // -----------------------------------------------------------------------
    // outgoing URL rendering
    // -----------------------------------------------------------------------

    fn cfg_with_format(template: &str) -> OriginConfig {
        let mut cfg = base_config();
        cfg.outgoing_url_formats.insert(
            "outgoing_url_format".into(),
            BTreeMap::from([("http".to_string(), template.to_string())]),
        );
        cfg
    }

    #[test]
    fn urls_render_hash_and_hash_mod() {
        let mut cfg = cfg_with_format("http://{hash}.r{hash_mod}.cdn.example.com/");
        cfg.number_dns_shards = 3;
        let urls = cdn_urls(&cfg, "8f88401087397546171c9871a3a1089e", "GET", "").unwrap();
        // int(key, 16) % 3 == 2; trailing slash is stripped
        assert_eq!(
            urls["http"],
            "http://8f88401087397546171c9871a3a1089e.r2.cdn.example.com"
        );
    }

    #[test]
    fn missing_format_section_is_a_configuration_error() {
        let cfg = base_config();
        assert!(matches!(
            cdn_urls(&cfg, "abc123", "GET", ""),
            Err(OriginError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn format_tag_selects_specific_section() {
        let mut cfg = cfg_with_format("http://plain.example.com");
        cfg.outgoing_url_formats.insert(
            "outgoing_url_format_get_json".into(),
            BTreeMap::from([("http".to_string(), "http://json.example.com".to_string())]),
        );
        let urls = cdn_urls(&cfg, "abc123", "GET", "json").unwrap();
        assert_eq!(urls["http"], "http://json.example.com");
        let urls = cdn_urls(&cfg, "abc123", "HEAD", "").unwrap();
        assert_eq!(urls["http"], "http://plain.example.com");
    }

    // -----------------------------------------------------------------------
    // signed hostnames
    // -----------------------------------------------------------------------

    #[test]
    fn signed_host_uses_hmac_sha1_prefix() {
        // hmac-sha1("k", "cdn.example.com") = 96a39ff267afa84b52d5a77b4b01ae27d6f6cb82
        let signed = sign_host("k", 8, "https://cdn.example.com").unwrap();
        assert_eq!(signed, "https://96a39ff2-cdn.example.com");
    }

    #[test]
    fn signed_host_token_is_stable_and_sized() {
        let a = sign_host("secret", 30, "https://cdn.example.com").unwrap();
        let b = sign_host("secret", 30, "https://cdn.example.com").unwrap();
        assert_eq!(a, b);
        let token = a
            .strip_prefix("https://")
            .unwrap()
            .split('-')
            .next()
            .unwrap();
        assert_eq!(token.len(), 30);
    }

    #[test]
    fn signing_applies_to_rendered_urls() {
        let mut cfg = cfg_with_format("https://cdn.example.com");
        cfg.hmac_signed_url_secret = Some("k".into());
        cfg.hmac_token_length = 8;
        let urls = cdn_urls(&cfg, "abc123", "GET", "").unwrap();
        assert_eq!(urls["http"], "https://96a39ff2-cdn.example.com");
    }

    #[test]
    fn signing_discards_port_and_path() {
        let signed = sign_host("k", 8, "https://cdn.example.com:8080").unwrap();
        assert_eq!(signed, "https://96a39ff2-cdn.example.com");
    }
}
