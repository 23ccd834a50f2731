//! Wire shapes consumed by the shift tracking core.
//!
//! The backend and the QR-issuing feature own these formats; this crate only
//! pins down what we read from them so the core and the CLI cannot drift.
//! Validation here is structural. Semantic checks (digests, transitions) live
//! in `shift-core`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend response code for a successful call.
pub const SUCCESS_CODE: i32 = 200;

/// Format the backend expects for submitted check-in/check-out times.
/// No zone marker: the backend stores what it receives.
pub const SUBMISSION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Prefix of first-generation identity codes (`VG_USER_<base64>`).
pub const LEGACY_CODE_PREFIX: &str = "VG_USER_";
/// Prefix of hash identity codes (`VG_HASH_<issued>_<worker>_<digest>`).
pub const HASH_CODE_PREFIX: &str = "VG_HASH_";
/// Type discriminator carried in legacy identity JSON.
pub const LEGACY_IDENTITY_TYPE: &str = "user_identity";

const MAX_DIGEST_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Backend envelope
// ═══════════════════════════════════════════════════════════════════════════════

/// `{ "code": 200, "msg": "...", "data": ... }` wrapper used by every backend call.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiEnvelope<T> {
    pub code: i32,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: Option<T>) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
            data,
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: Some(msg.into()),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Unwraps the payload of a successful response.
    pub fn into_result(self) -> Result<Option<T>, ErrorInfo> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(ErrorInfo::new(
                "backend_error",
                self.msg
                    .unwrap_or_else(|| format!("backend returned code {}", self.code)),
            ))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Attendance records
// ═══════════════════════════════════════════════════════════════════════════════

/// A timestamp as the backend sends it: either a string in one of several
/// formats or a bare Unix number.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawTime {
    Integer(i64),
    Text(String),
}

impl RawTime {
    /// Empty strings are how the backend spells "no value" in some endpoints.
    pub fn is_blank(&self) -> bool {
        matches!(self, RawTime::Text(text) if text.trim().is_empty())
    }
}

impl std::fmt::Display for RawTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawTime::Integer(value) => write!(f, "{}", value),
            RawTime::Text(text) => f.write_str(text),
        }
    }
}

/// Last attendance record for a worker, as returned by the record lookup.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecordDto {
    #[serde(default)]
    pub id: Option<u64>,
    pub user_id: u64,
    #[serde(default)]
    pub start_time: Option<RawTime>,
    #[serde(default)]
    pub end_time: Option<RawTime>,
    /// 1 = regular record. Other values are kept but not interpreted.
    #[serde(default, rename = "type")]
    pub record_type: Option<i32>,
    #[serde(default)]
    pub operate_user_id: Option<u64>,
    #[serde(default)]
    pub operate_legal_name: Option<String>,
    #[serde(default)]
    pub legal_name: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
}

impl ServerRecordDto {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.user_id == 0 {
            return Err(ErrorInfo::new("invalid_user_id", "userId is required"));
        }
        match &self.start_time {
            Some(start) if !start.is_blank() => {}
            _ => {
                return Err(ErrorInfo::new(
                    "missing_field",
                    "startTime is required",
                ))
            }
        }
        Ok(())
    }

    /// Treats a blank `endTime` the same as an absent one.
    pub fn end_time(&self) -> Option<&RawTime> {
        self.end_time.as_ref().filter(|end| !end.is_blank())
    }

    pub fn is_open(&self) -> bool {
        self.end_time().is_none()
    }
}

pub fn parse_server_record(data: Value) -> Result<ServerRecordDto, ErrorInfo> {
    let record: ServerRecordDto = serde_json::from_value(data).map_err(|err| {
        ErrorInfo::new(
            "invalid_record",
            format!("attendance record is invalid JSON: {}", err),
        )
    })?;
    record.validate()?;
    Ok(record)
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    CheckIn,
    CheckOut,
}

/// Body of a check-in or check-out submission.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDto {
    pub kind: SubmissionKind,
    pub user_id: u64,
    pub operate_user_id: u64,
    /// Formatted with [`SUBMISSION_TIME_FORMAT`].
    pub time: String,
    #[serde(default)]
    pub remark: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identity codes
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON body of a legacy identity code. Issuers added fields over time, so
/// unknown fields are tolerated and everything is optional at this layer.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LegacyIdentityBody {
    /// String in most issued codes, number in some older ones.
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub legal_name: Option<String>,
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl LegacyIdentityBody {
    /// Numeric worker id, accepting `"123"` and `123`.
    pub fn worker_id(&self) -> Option<u64> {
        match self.user_id.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Parsed `VG_HASH_<issued>_<worker>_<digest>` code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashCode {
    /// Unix seconds at which the code was issued.
    pub issued_at: i64,
    pub worker_id: u64,
    /// Lowercase hex.
    pub digest: String,
}

impl std::fmt::Display for HashCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}_{}_{}",
            HASH_CODE_PREFIX, self.issued_at, self.worker_id, self.digest
        )
    }
}

pub fn parse_hash_code(raw: &str) -> Result<HashCode, ErrorInfo> {
    let body = raw
        .trim()
        .strip_prefix(HASH_CODE_PREFIX)
        .ok_or_else(|| ErrorInfo::new("invalid_prefix", "not a hash identity code"))?;

    let parts: Vec<&str> = body.split('_').collect();
    if parts.len() != 3 {
        return Err(ErrorInfo::new(
            "invalid_layout",
            format!("expected 3 fields after prefix, found {}", parts.len()),
        ));
    }

    let issued_at = parse_digits(parts[0], "issued_at")?;
    let worker_id = parse_digits(parts[1], "worker_id")?;
    let digest = parts[2];
    if digest.is_empty()
        || digest.len() > MAX_DIGEST_LEN
        || !digest.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(ErrorInfo::new("invalid_digest", "digest must be short hex"));
    }

    Ok(HashCode {
        issued_at: issued_at as i64,
        worker_id,
        digest: digest.to_ascii_lowercase(),
    })
}

fn parse_digits(value: &str, field: &str) -> Result<u64, ErrorInfo> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(ErrorInfo::new(
            "invalid_field",
            format!("{} must be numeric", field),
        ));
    }
    value
        .parse::<u64>()
        .ok()
        .filter(|v| *v <= i64::MAX as u64)
        .ok_or_else(|| ErrorInfo::new("invalid_field", format!("{} is out of range", field)))
}
