use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use axum::http::Uri;
use regex::Regex;

/// Text values accepted as "true". Every boolean read — config value or
/// request header — goes through [`truthy`] so the accepted set is the same
/// everywhere.
const TRUE_VALUES: &[&str] = &["1", "true", "yes", "on", "t", "y"];

pub fn truthy(value: &str) -> bool {
    TRUE_VALUES.contains(&value.trim().to_ascii_lowercase().as_str())
}

/// Immutable configuration snapshot, read once at startup and shared by
/// reference with every handler. Nothing here is re-read at request time.
#[derive(Debug, Clone)]
pub struct OriginConfig {
    /// Bind address (env: LISTEN_ADDR)
    pub listen_addr: String,

    /// Base URL of the backing object-storage cluster (env: STORAGE_URL)
    pub storage_url: String,

    /// Admin identity token sent on authenticated sub-requests
    /// (env: STORAGE_ADMIN_TOKEN)
    pub storage_admin_token: Option<String>,

    /// Deployment-wide secret folded into every container key
    /// (env: HASH_PATH_SUFFIX, required)
    pub hash_path_suffix: String,

    /// Admin account holding hash and listing containers (env: ORIGIN_ACCOUNT)
    pub origin_account: String,

    /// Shard count for metadata objects (env: NUMBER_HASH_ID_CONTAINERS)
    pub number_hash_id_containers: u64,

    /// DNS fan-out modulus for outgoing URLs (env: NUMBER_DNS_SHARDS)
    pub number_dns_shards: u64,

    /// Secret enabling the signed-host prefix on outgoing URLs
    /// (env: HMAC_SIGNED_URL_SECRET)
    pub hmac_signed_url_secret: Option<String>,

    /// Length of the signed-host token prefix (env: HMAC_TOKEN_LENGTH)
    pub hmac_token_length: usize,

    /// Host allowlist for the tenant-facing database surface
    /// (env: ORIGIN_DB_HOSTS, csv)
    pub origin_db_hosts: Vec<String>,

    /// Host-suffix allowlist for the public edge surface
    /// (env: ORIGIN_CDN_HOST_SUFFIXES, csv, required non-empty)
    pub origin_cdn_host_suffixes: Vec<String>,

    /// Path prefix for the admin surface (env: ORIGIN_PREFIX)
    pub origin_prefix: String,

    /// TTL policy bounds and default (env: MIN_TTL / MAX_TTL / DEFAULT_TTL)
    pub min_ttl: u64,
    pub max_ttl: u64,
    pub default_ttl: u64,

    /// Whether DELETE is served at all (env: DELETE_ENABLED)
    pub delete_enabled: bool,

    /// Upper bound on object size served through the edge
    /// (env: MAX_CDN_FILE_SIZE)
    pub max_cdn_file_size: u64,

    /// Optional IP allowlist for the edge surface
    /// (env: ALLOWED_ORIGIN_REMOTE_IPS, csv)
    pub allowed_origin_remote_ips: Vec<String>,

    /// Shared secret gating the admin surface (env: ORIGIN_ADMIN_KEY)
    pub origin_admin_key: Option<String>,

    /// Emit the per-request access log line (env: LOG_ACCESS_REQUESTS)
    pub log_access_requests: bool,

    /// Capacity of the in-process metadata cache
    /// (env: METADATA_CACHE_ENTRIES)
    pub metadata_cache_entries: u64,

    /// Named regexes extracting `hash` and optional `object_name` from edge
    /// URLs, tried in name order (env: INCOMING_URL_REGEX, JSON object,
    /// required non-empty)
    pub incoming_url_patterns: Vec<(String, Regex)>,

    /// Outgoing URL format sections, keyed by full section name. Each env
    /// var starting with OUTGOING_URL_FORMAT holds a JSON object of
    /// {key: template}; templates may use `{hash}` and `{hash_mod}`.
    pub outgoing_url_formats: BTreeMap<String, BTreeMap<String, String>>,
}

impl OriginConfig {
    pub fn from_env() -> Result<Self> {
        let hash_path_suffix = std::env::var("HASH_PATH_SUFFIX").unwrap_or_default();
        if hash_path_suffix.is_empty() {
            bail!("please provide a HASH_PATH_SUFFIX");
        }

        let origin_cdn_host_suffixes =
            parse_csv(&std::env::var("ORIGIN_CDN_HOST_SUFFIXES").unwrap_or_default());
        if origin_cdn_host_suffixes.is_empty() {
            bail!("please add ORIGIN_CDN_HOST_SUFFIXES");
        }

        let incoming_url_patterns =
            parse_incoming_patterns(&std::env::var("INCOMING_URL_REGEX").unwrap_or_default())?;
        if incoming_url_patterns.is_empty() {
            bail!("please provide at least one INCOMING_URL_REGEX pattern");
        }

        let mut outgoing_url_formats = BTreeMap::new();
        for (key, value) in std::env::vars() {
            if key.starts_with("OUTGOING_URL_FORMAT") {
                let section = key.to_ascii_lowercase();
                let templates = parse_format_section(&section, &value)?;
                outgoing_url_formats.insert(section, templates);
            }
        }

        let config = Self {
            listen_addr: env_or("LISTEN_ADDR", "0.0.0.0:8080"),
            storage_url: std::env::var("STORAGE_URL").context("STORAGE_URL not set")?,
            storage_admin_token: std::env::var("STORAGE_ADMIN_TOKEN").ok(),
            hash_path_suffix,
            origin_account: env_or("ORIGIN_ACCOUNT", ".origin"),
            number_hash_id_containers: env_u64("NUMBER_HASH_ID_CONTAINERS", 100)?,
            number_dns_shards: env_u64("NUMBER_DNS_SHARDS", 100)?,
            hmac_signed_url_secret: std::env::var("HMAC_SIGNED_URL_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            hmac_token_length: env_u64("HMAC_TOKEN_LENGTH", 30)? as usize,
            origin_db_hosts: parse_csv(&std::env::var("ORIGIN_DB_HOSTS").unwrap_or_default()),
            origin_cdn_host_suffixes,
            origin_prefix: env_or("ORIGIN_PREFIX", "/origin/"),
            min_ttl: env_u64("MIN_TTL", 900)?,
            max_ttl: env_u64("MAX_TTL", 3_155_692_600)?,
            default_ttl: env_u64("DEFAULT_TTL", 259_200)?,
            delete_enabled: std::env::var("DELETE_ENABLED")
                .map(|v| truthy(&v))
                .unwrap_or(true),
            max_cdn_file_size: env_u64("MAX_CDN_FILE_SIZE", 10 * 1024 * 1024 * 1024)?,
            allowed_origin_remote_ips: parse_csv(
                &std::env::var("ALLOWED_ORIGIN_REMOTE_IPS").unwrap_or_default(),
            ),
            origin_admin_key: std::env::var("ORIGIN_ADMIN_KEY").ok(),
            log_access_requests: std::env::var("LOG_ACCESS_REQUESTS")
                .map(|v| truthy(&v))
                .unwrap_or(true),
            metadata_cache_entries: env_u64("METADATA_CACHE_ENTRIES", 100_000)?,
            incoming_url_patterns,
            outgoing_url_formats,
        };
        config.validate_url_formats()?;
        Ok(config)
    }

    /// Select the most specific outgoing-URL format section for a request.
    /// Precedence: `outgoing_url_format_<method>_<tag>`, then
    /// `outgoing_url_format_<method>`, then `outgoing_url_format`.
    pub fn format_section(&self, method: &str, tag: &str) -> Option<&BTreeMap<String, String>> {
        let method = method.to_ascii_lowercase();
        let candidates = [
            format!("outgoing_url_format_{method}_{tag}"),
            format!("outgoing_url_format_{method}"),
            "outgoing_url_format".to_string(),
        ];
        candidates
            .iter()
            .find_map(|name| self.outgoing_url_formats.get(name))
    }

    /// The signed-host rewrite keeps only scheme and host; a template that
    /// renders with a path component would silently lose it, so when signing
    /// is enabled such templates are rejected up front.
    fn validate_url_formats(&self) -> Result<()> {
        if self.hmac_signed_url_secret.is_none() {
            return Ok(());
        }
        for (section, templates) in &self.outgoing_url_formats {
            for (key, template) in templates {
                let rendered = template
                    .replace("{hash}", &"0".repeat(32))
                    .replace("{hash_mod}", "0");
                let rendered = rendered.trim_end_matches('/');
                let uri: Uri = rendered
                    .parse()
                    .with_context(|| format!("unparsable template {section}.{key}"))?;
                if !uri.path().is_empty() && uri.path() != "/" {
                    bail!(
                        "template {section}.{key} carries a path component, \
                         which the signed-host rewrite would discard"
                    );
                }
            }
        }
        Ok(())
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{name} must be a non-negative integer, got {v:?}")),
        Err(_) => Ok(default),
    }
}

/// Split a comma-separated value, dropping empty entries.
pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Parse a JSON object of `{name: pattern}` into compiled regexes, sorted by
/// name so "first match wins" is deterministic.
pub fn parse_incoming_patterns(raw: &str) -> Result<Vec<(String, Regex)>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let sections: BTreeMap<String, String> =
        serde_json::from_str(raw).context("INCOMING_URL_REGEX must be a JSON object")?;
    let mut patterns = Vec::with_capacity(sections.len());
    for (name, pattern) in sections {
        let regex = Regex::new(&pattern)
            .with_context(|| format!("invalid INCOMING_URL_REGEX pattern {name:?}"))?;
        patterns.push((name, regex));
    }
    Ok(patterns)
}

/// Parse a JSON object of `{key: template}` for one format section.
pub fn parse_format_section(name: &str, raw: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(raw).with_context(|| format!("{name} must be a JSON object of templates"))
}
