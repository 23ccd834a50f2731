use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shift_protocol::{
    parse_hash_code, HashCode, LegacyIdentityBody, HASH_CODE_PREFIX, LEGACY_CODE_PREFIX,
    LEGACY_IDENTITY_TYPE,
};

use super::decoders::Base64Chain;
use crate::error::IdentityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingVersion {
    LegacyBase64Json,
    HashLookup,
}

/// Identity carried by a scanned code. Only returned once verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPayload {
    pub worker_id: u64,
    pub display_name: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub digest: Option<String>,
    pub encoding_version: EncodingVersion,
}

/// Authoritative identity as returned by the identity lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub user_id: u64,
    pub user_name: String,
    pub legal_name: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub school_id: Option<String>,
}

/// A code after framing has been parsed, before any trust decision.
#[derive(Debug, Clone)]
pub enum ScannedCode {
    Legacy(LegacyIdentityBody),
    Hash(HashCode),
}

impl ScannedCode {
    pub fn parse(raw: &str, decoders: &Base64Chain) -> Result<Self, IdentityError> {
        let raw = raw.trim();
        if raw.starts_with(HASH_CODE_PREFIX) {
            return parse_hash_code(raw)
                .map(ScannedCode::Hash)
                .map_err(|e| IdentityError::unparsable(e.message));
        }
        if let Some(body) = raw.strip_prefix(LEGACY_CODE_PREFIX) {
            return decode_legacy(body, decoders).map(ScannedCode::Legacy);
        }
        Err(IdentityError::unparsable("unknown code prefix"))
    }

    pub fn encoding_version(&self) -> EncodingVersion {
        match self {
            ScannedCode::Legacy(_) => EncodingVersion::LegacyBase64Json,
            ScannedCode::Hash(_) => EncodingVersion::HashLookup,
        }
    }
}

fn decode_legacy(body: &str, decoders: &Base64Chain) -> Result<LegacyIdentityBody, IdentityError> {
    let (bytes, strategy) = decoders
        .decode(body)
        .map_err(|failures| IdentityError::unparsable(format!("base64: {}", failures.join("; "))))?;
    tracing::debug!(strategy, "Decoded legacy identity code");

    let encoded = String::from_utf8(bytes)
        .map_err(|_| IdentityError::unparsable("decoded bytes are not UTF-8"))?;
    let json = match urlencoding::decode(&encoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            tracing::debug!(error = %e, "Percent-decoding failed, using raw text");
            encoded
        }
    };

    let parsed: LegacyIdentityBody = serde_json::from_str(&json)
        .map_err(|e| IdentityError::unparsable(format!("json: {}", e)))?;

    if parsed.kind.as_deref() != Some(LEGACY_IDENTITY_TYPE) {
        return Err(IdentityError::unparsable("type is not user_identity"));
    }
    if parsed.worker_id().is_none() {
        return Err(IdentityError::unparsable("missing or invalid userId"));
    }
    if parsed
        .legal_name
        .as_deref()
        .map_or(true, |name| name.trim().is_empty())
    {
        return Err(IdentityError::unparsable("missing legalName"));
    }
    Ok(parsed)
}
