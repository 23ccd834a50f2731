use chrono::{TimeZone, Utc};
use shift_protocol::HashCode;

use super::decoders::Base64Chain;
use super::digest::{compute_digest, digests_match, DigestScheme};
use super::payload::{EncodingVersion, IdentityPayload, ScannedCode};
use crate::error::IdentityError;
use crate::services::IdentityLookup;

/// Verifies scanned identity codes of both generations.
///
/// Legacy codes carry their identity in the payload and pass on format checks
/// alone. Hash codes carry only a worker id and digest; the identity is looked
/// up and the digest recomputed before anything is trusted.
pub struct IdentityHashVerifier {
    decoders: Base64Chain,
    scheme: DigestScheme,
}

impl Default for IdentityHashVerifier {
    fn default() -> Self {
        Self::new(DigestScheme::default())
    }
}

impl IdentityHashVerifier {
    pub fn new(scheme: DigestScheme) -> Self {
        Self {
            decoders: Base64Chain::default(),
            scheme,
        }
    }

    pub fn with_decoders(mut self, decoders: Base64Chain) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn scheme(&self) -> DigestScheme {
        self.scheme
    }

    /// Framing only. Nothing returned here is trusted yet.
    pub fn parse(&self, code: &str) -> Result<ScannedCode, IdentityError> {
        ScannedCode::parse(code, &self.decoders)
    }

    pub async fn verify<L: IdentityLookup>(
        &self,
        code: &str,
        lookup: &L,
    ) -> Result<IdentityPayload, IdentityError> {
        match self.parse(code)? {
            ScannedCode::Legacy(body) => {
                // parse() has already required both fields.
                let worker_id = body
                    .worker_id()
                    .ok_or_else(|| IdentityError::unparsable("missing userId"))?;
                let display_name = body
                    .legal_name
                    .clone()
                    .ok_or_else(|| IdentityError::unparsable("missing legalName"))?;
                tracing::info!(worker_id, "Verified legacy identity code");
                Ok(IdentityPayload {
                    worker_id,
                    display_name,
                    issued_at: None,
                    digest: None,
                    encoding_version: EncodingVersion::LegacyBase64Json,
                })
            }
            ScannedCode::Hash(hash) => self.verify_hash(hash, lookup).await,
        }
    }

    async fn verify_hash<L: IdentityLookup>(
        &self,
        code: HashCode,
        lookup: &L,
    ) -> Result<IdentityPayload, IdentityError> {
        let worker_id = code.worker_id;
        let record = lookup
            .identity(worker_id)
            .await?
            .ok_or(IdentityError::NotFound { worker_id })?;

        let expected = compute_digest(self.scheme, &record, code.issued_at);
        if record.user_id != worker_id || !digests_match(&expected, &code.digest) {
            tracing::warn!(worker_id, "Identity code digest mismatch");
            return Err(IdentityError::Tampered { worker_id });
        }

        tracing::info!(worker_id, "Verified hash identity code");
        Ok(IdentityPayload {
            worker_id,
            display_name: record.legal_name,
            issued_at: Utc.timestamp_opt(code.issued_at, 0).single(),
            digest: Some(code.digest),
            encoding_version: EncodingVersion::HashLookup,
        })
    }
}
