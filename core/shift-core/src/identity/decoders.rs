//! Base64 decoding strategies for legacy identity codes.
//!
//! Issued codes went through several encoders, some of which dropped padding
//! or emitted URL-safe characters. Strategies are tried in order until one
//! succeeds.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

pub trait Base64Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn decode(&self, input: &str) -> Result<Vec<u8>, String>;
}

/// Strict RFC 4648 with padding.
#[derive(Debug, Default)]
pub struct StandardEngine;

impl Base64Strategy for StandardEngine {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn decode(&self, input: &str) -> Result<Vec<u8>, String> {
        STANDARD.decode(input).map_err(|e| e.to_string())
    }
}

/// Optional padding, trailing bits allowed, whitespace stripped and URL-safe
/// characters mapped back to the standard alphabet.
#[derive(Debug, Default)]
pub struct LenientEngine;

impl Base64Strategy for LenientEngine {
    fn name(&self) -> &'static str {
        "lenient"
    }

    fn decode(&self, input: &str) -> Result<Vec<u8>, String> {
        let cleaned: String = input
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '-' => '+',
                '_' => '/',
                other => other,
            })
            .collect();
        LENIENT.decode(cleaned).map_err(|e| e.to_string())
    }
}

/// Bit-level decoder that skips anything outside the alphabet and stops at the
/// first `=`.
#[derive(Debug, Default)]
pub struct ManualDecoder;

impl Base64Strategy for ManualDecoder {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn decode(&self, input: &str) -> Result<Vec<u8>, String> {
        let mut out = Vec::with_capacity(input.len() * 3 / 4);
        let mut buffer: u32 = 0;
        let mut bits = 0u32;

        for byte in input.bytes() {
            if byte == b'=' {
                break;
            }
            let Some(value) = ALPHABET.iter().position(|&a| a == byte) else {
                continue;
            };
            buffer = (buffer << 6) | value as u32;
            bits += 6;
            if bits >= 8 {
                bits -= 8;
                out.push((buffer >> bits) as u8);
                buffer &= (1 << bits) - 1;
            }
        }

        if out.is_empty() {
            return Err("no decodable base64 content".to_string());
        }
        Ok(out)
    }
}

/// Ordered list of strategies.
pub struct Base64Chain {
    strategies: Vec<Box<dyn Base64Strategy>>,
}

impl Default for Base64Chain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(StandardEngine),
            Box::new(LenientEngine),
            Box::new(ManualDecoder),
        ])
    }
}

impl Base64Chain {
    pub fn new(strategies: Vec<Box<dyn Base64Strategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Bytes from the first strategy that succeeds, or every failure reason.
    pub fn decode(&self, input: &str) -> Result<(Vec<u8>, &'static str), Vec<String>> {
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match strategy.decode(input) {
                Ok(bytes) => return Ok((bytes, strategy.name())),
                Err(e) => {
                    tracing::debug!(strategy = strategy.name(), error = %e, "Base64 strategy failed");
                    failures.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }
        Err(failures)
    }
}
