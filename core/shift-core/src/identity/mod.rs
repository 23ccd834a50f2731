//! Scanned identity codes.
//!
//! Two generations are accepted indefinitely:
//!
//! | generation | framing | trust |
//! |---|---|---|
//! | legacy | `VG_USER_<base64(urlencode(json))>` | format checks |
//! | hash | `VG_HASH_<issued>_<worker>_<digest>` | lookup + recomputed digest |

mod decoders;
mod digest;
mod payload;
mod verifier;

pub use decoders::{Base64Chain, Base64Strategy, LenientEngine, ManualDecoder, StandardEngine};
pub use digest::{
    compute_digest, digests_match, issue_hash_code, string_hash32, DigestScheme, DIGEST_LEN,
};
pub use payload::{EncodingVersion, IdentityPayload, IdentityRecord, ScannedCode};
pub use verifier::IdentityHashVerifier;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IdentityError, ServiceError};
    use crate::services::IdentityLookup;
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
    use base64::Engine as _;
    use std::collections::HashMap;

    struct Directory {
        records: HashMap<u64, IdentityRecord>,
        offline: bool,
    }

    impl IdentityLookup for Directory {
        async fn identity(&self, worker_id: u64) -> Result<Option<IdentityRecord>, ServiceError> {
            if self.offline {
                return Err(ServiceError::Unavailable("offline".to_string()));
            }
            Ok(self.records.get(&worker_id).cloned())
        }
    }

    fn record() -> IdentityRecord {
        IdentityRecord {
            user_id: 12345,
            user_name: "zhangsan".to_string(),
            legal_name: "张三".to_string(),
            organization_id: Some("1".to_string()),
            school_id: Some("213".to_string()),
        }
    }

    fn directory() -> Directory {
        Directory {
            records: HashMap::from([(12345, record())]),
            offline: false,
        }
    }

    fn legacy_code(json: &str) -> String {
        format!("VG_USER_{}", STANDARD.encode(urlencoding::encode(json).as_bytes()))
    }

    #[tokio::test]
    async fn test_legacy_code_verifies() {
        let code = legacy_code(
            r#"{"userId":"12345","userName":"zhangsan","legalName":"张三","type":"user_identity"}"#,
        );
        let payload = IdentityHashVerifier::default()
            .verify(&code, &directory())
            .await
            .unwrap();
        assert_eq!(payload.worker_id, 12345);
        assert_eq!(payload.display_name, "张三");
        assert_eq!(payload.encoding_version, EncodingVersion::LegacyBase64Json);
        assert_eq!(payload.digest, None);
    }

    #[tokio::test]
    async fn test_legacy_code_without_padding_or_urlencoding() {
        let json = r#"{"userId":7,"legalName":"Lin","type":"user_identity"}"#;
        let code = format!("VG_USER_{}", STANDARD_NO_PAD.encode(json));
        let payload = IdentityHashVerifier::default()
            .verify(&code, &directory())
            .await
            .unwrap();
        assert_eq!(payload.worker_id, 7);
    }

    #[tokio::test]
    async fn test_legacy_code_with_malformed_json_is_unparsable() {
        let code = legacy_code(r#"{"userId":"12345","legalName":"#);
        let err = IdentityHashVerifier::default()
            .verify(&code, &directory())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Unparsable { .. }));
    }

    #[tokio::test]
    async fn test_legacy_code_requires_fields_and_type() {
        let verifier = IdentityHashVerifier::default();
        for json in [
            r#"{"legalName":"Lin","type":"user_identity"}"#,
            r#"{"userId":"7","type":"user_identity"}"#,
            r#"{"userId":"7","legalName":"Lin","type":"activity"}"#,
            r#"{"userId":"guest","legalName":"Lin","type":"user_identity"}"#,
        ] {
            let err = verifier.verify(&legacy_code(json), &directory()).await.unwrap_err();
            assert!(matches!(err, IdentityError::Unparsable { .. }), "{json}");
        }
    }

    #[tokio::test]
    async fn test_hash_code_verifies_with_looked_up_name() {
        let code = issue_hash_code(&record(), 1757555446, DigestScheme::StringHash32);
        let payload = IdentityHashVerifier::default()
            .verify(&code, &directory())
            .await
            .unwrap();
        assert_eq!(payload.worker_id, 12345);
        assert_eq!(payload.display_name, "张三");
        assert_eq!(payload.encoding_version, EncodingVersion::HashLookup);
        assert_eq!(payload.issued_at.map(|t| t.timestamp()), Some(1757555446));
    }

    #[tokio::test]
    async fn test_hash_code_with_wrong_digest_is_tampered() {
        let code = issue_hash_code(&record(), 1757555446, DigestScheme::StringHash32);
        let (prefix, digest) = code.rsplit_once('_').unwrap();
        let flipped: String = digest
            .chars()
            .map(|c| if c == '0' { '1' } else { '0' })
            .collect();
        let forged = format!("{}_{}", prefix, flipped);

        let err = IdentityHashVerifier::default()
            .verify(&forged, &directory())
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::Tampered { worker_id: 12345 });
    }

    #[tokio::test]
    async fn test_hash_code_with_changed_timestamp_is_tampered() {
        let code = issue_hash_code(&record(), 1757555446, DigestScheme::StringHash32);
        let forged = code.replacen("1757555446", "1757555999", 1);
        let err = IdentityHashVerifier::default()
            .verify(&forged, &directory())
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::Tampered { worker_id: 12345 });
    }

    #[tokio::test]
    async fn test_scheme_must_match_issuer() {
        let code = issue_hash_code(&record(), 1757555446, DigestScheme::Sha256);
        let sha = IdentityHashVerifier::new(DigestScheme::Sha256);
        assert!(sha.verify(&code, &directory()).await.is_ok());

        let err = IdentityHashVerifier::default()
            .verify(&code, &directory())
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::Tampered { worker_id: 12345 });
    }

    #[tokio::test]
    async fn test_hash_code_for_unknown_worker_is_not_found() {
        let mut other = record();
        other.user_id = 999;
        let code = issue_hash_code(&other, 1757555446, DigestScheme::StringHash32);
        let err = IdentityHashVerifier::default()
            .verify(&code, &directory())
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::NotFound { worker_id: 999 });
    }

    #[tokio::test]
    async fn test_lookup_failure_is_transient() {
        let code = issue_hash_code(&record(), 1757555446, DigestScheme::StringHash32);
        let offline = Directory {
            records: HashMap::new(),
            offline: true,
        };
        let err = IdentityHashVerifier::default()
            .verify(&code, &offline)
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Lookup(_)));
    }

    #[tokio::test]
    async fn test_unknown_prefix_is_unparsable() {
        for code in ["", "hello", "VG_ACTIVITY_12", "VG_HASH_abc"] {
            let err = IdentityHashVerifier::default()
                .verify(code, &directory())
                .await
                .unwrap_err();
            assert!(matches!(err, IdentityError::Unparsable { .. }), "{code:?}");
        }
    }

    #[test]
    fn test_parse_dispatches_generation() {
        let verifier = IdentityHashVerifier::default();
        let hash = verifier
            .parse(&issue_hash_code(&record(), 1, DigestScheme::StringHash32))
            .unwrap();
        assert_eq!(hash.encoding_version(), EncodingVersion::HashLookup);

        let legacy = verifier
            .parse(&legacy_code(
                r#"{"userId":"1","legalName":"A","type":"user_identity"}"#,
            ))
            .unwrap();
        assert_eq!(legacy.encoding_version(), EncodingVersion::LegacyBase64Json);
    }
}
