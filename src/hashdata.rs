use serde::{Deserialize, Serialize};

use crate::error::OriginError;

/// Per-container CDN metadata, stored as a JSON object in the origin
/// database. The serialized form round-trips exactly: every field is
/// required and strictly typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashData {
    pub account: String,
    pub container: String,
    pub ttl: u64,
    pub cdn_enabled: bool,
    pub logs_enabled: bool,
}

impl HashData {
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        ttl: u64,
        cdn_enabled: bool,
        logs_enabled: bool,
    ) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
            ttl,
            cdn_enabled,
            logs_enabled,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("HashData serializes to JSON")
    }

    /// Parse the serialized form. Any missing field, wrong scalar type, or
    /// unparsable envelope (including non-UTF-8 bytes) is a value error.
    pub fn from_json(raw: &[u8]) -> Result<Self, OriginError> {
        serde_json::from_slice(raw)
            .map_err(|e| OriginError::InvalidRecord(format!("problem loading json: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trips_exactly() {
        let data = HashData::new("acct", "cont", 3600, true, false);
        let parsed = HashData::from_json(data.to_json().as_bytes()).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn field_order_is_irrelevant() {
        let raw = br#"{"logs_enabled":true,"ttl":900,"container":"c","cdn_enabled":false,"account":"a"}"#;
        let parsed = HashData::from_json(raw).unwrap();
        assert_eq!(parsed, HashData::new("a", "c", 900, false, true));
    }

    #[test]
    fn missing_field_is_rejected() {
        let raw = br#"{"account":"a","container":"c","ttl":900,"cdn_enabled":true}"#;
        assert!(HashData::from_json(raw).is_err());
    }

    #[test]
    fn wrong_scalar_type_is_rejected() {
        let raw = br#"{"account":"a","container":"c","ttl":"soon","cdn_enabled":true,"logs_enabled":false}"#;
        assert!(HashData::from_json(raw).is_err());
    }

    #[test]
    fn negative_ttl_is_rejected() {
        let raw = br#"{"account":"a","container":"c","ttl":-1,"cdn_enabled":true,"logs_enabled":false}"#;
        assert!(HashData::from_json(raw).is_err());
    }

    #[test]
    fn unparsable_envelope_is_rejected() {
        assert!(HashData::from_json(b"not json at all").is_err());
        assert!(HashData::from_json(b"[1, 2, 3]").is_err());
        assert!(HashData::from_json(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn utf8_names_survive_the_round_trip() {
        let data = HashData::new("acc\u{00e9}nt", "c\u{00f6}nt", 60, true, true);
        let parsed = HashData::from_json(data.to_json().as_bytes()).unwrap();
        assert_eq!(parsed.account, "acc\u{00e9}nt");
        assert_eq!(parsed.container, "c\u{00f6}nt");
    }
}
