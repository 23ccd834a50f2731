//! Digests for hash-generation identity codes.
//!
//! Input is `userId|userName|<first two UTF-16 units of legalName>|
//! organizationId|schoolId|issuedAt`, with absent ids rendered empty.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use shift_protocol::HashCode;

use super::payload::IdentityRecord;

pub const DIGEST_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestScheme {
    /// 31-multiplier 32-bit string hash over UTF-16 units, `abs`, hex.
    /// Every code issued so far uses this.
    #[default]
    StringHash32,
    /// First eight hex chars of SHA-256 over the UTF-8 input.
    Sha256,
}

fn digest_input(record: &IdentityRecord, issued_at: i64) -> Vec<u16> {
    let user_id = record.user_id.to_string();
    let issued_at = issued_at.to_string();
    let fields: [&str; 6] = [
        &user_id,
        &record.user_name,
        "",
        record.organization_id.as_deref().unwrap_or(""),
        record.school_id.as_deref().unwrap_or(""),
        &issued_at,
    ];

    let mut units = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            units.push(u16::from(b'|'));
        }
        if index == 2 {
            units.extend(record.legal_name.encode_utf16().take(2));
        } else {
            units.extend(field.encode_utf16());
        }
    }
    units
}

pub fn string_hash32(units: &[u16]) -> String {
    let hash = units.iter().fold(0i32, |hash, &unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    });
    let hex = format!("{:08x}", i64::from(hash).abs());
    hex[..DIGEST_LEN].to_string()
}

pub fn compute_digest(scheme: DigestScheme, record: &IdentityRecord, issued_at: i64) -> String {
    let units = digest_input(record, issued_at);
    match scheme {
        DigestScheme::StringHash32 => string_hash32(&units),
        DigestScheme::Sha256 => {
            let text = String::from_utf16_lossy(&units);
            let hash = Sha256::digest(text.as_bytes());
            hash.iter()
                .take(DIGEST_LEN / 2)
                .map(|b| format!("{:02x}", b))
                .collect()
        }
    }
}

/// Compares every byte regardless of where the first mismatch is.
pub fn digests_match(expected: &str, presented: &str) -> bool {
    let expected = expected.to_ascii_lowercase();
    let presented = presented.to_ascii_lowercase();
    if expected.len() != presented.len() {
        return false;
    }
    expected
        .bytes()
        .zip(presented.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Builds a current-generation `VG_HASH_...` code for `record`.
pub fn issue_hash_code(record: &IdentityRecord, issued_at: i64, scheme: DigestScheme) -> String {
    HashCode {
        issued_at,
        worker_id: record.user_id,
        digest: compute_digest(scheme, record, issued_at),
    }
    .to_string()
}
