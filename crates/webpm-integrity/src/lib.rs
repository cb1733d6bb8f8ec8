//! Subresource Integrity parsing and verification (spec §4.5).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use webpm_error::{Result, WebpmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl Algorithm {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    fn digest(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(bytes).to_vec(),
            Self::Sha256 => Sha256::digest(bytes).to_vec(),
            Self::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityEntry {
    pub algorithm: Algorithm,
    pub digest_base64: String,
}

impl fmt::Display for IntegrityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm.as_str(), self.digest_base64)
    }
}

/// One or more space-separated SRI entries; "any one matches" (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Integrity {
    pub entries: Vec<IntegrityEntry>,
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.entries.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(" "))
    }
}

pub fn parse_sri(integrity: &str) -> Result<Integrity> {
    let mut entries = Vec::new();
    for token in integrity.split_whitespace() {
        let (algo_str, digest) = token
            .split_once('-')
            .ok_or_else(|| WebpmError::InvalidIntegrity(integrity.to_string()))?;
        let algorithm = Algorithm::parse(algo_str)
            .ok_or_else(|| WebpmError::InvalidIntegrity(integrity.to_string()))?;
        if digest.is_empty() {
            return Err(WebpmError::InvalidIntegrity(integrity.to_string()));
        }
        entries.push(IntegrityEntry {
            algorithm,
            digest_base64: digest.to_string(),
        });
    }
    if entries.is_empty() {
        return Err(WebpmError::InvalidIntegrity(integrity.to_string()));
    }
    Ok(Integrity { entries })
}

/// Promote a legacy 40-character hex `shasum` into an SRI `sha1-<base64>`
/// entry (spec §4.5).
pub fn promote_shasum(shasum: &str) -> Result<Integrity> {
    if shasum.len() != 40 || !shasum.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WebpmError::InvalidIntegrity(shasum.to_string()));
    }
    let bytes = hex_decode(shasum)
        .ok_or_else(|| WebpmError::InvalidIntegrity(shasum.to_string()))?;
    Ok(Integrity {
        entries: vec![IntegrityEntry {
            algorithm: Algorithm::Sha1,
            digest_base64: BASE64.encode(bytes),
        }],
    })
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    Mismatch { computed: String },
}

/// Verify `bytes` against `integrity`; any one matching entry is sufficient.
#[must_use]
pub fn verify(bytes: &[u8], integrity: &Integrity) -> VerifyOutcome {
    let mut computed_for_report = String::new();
    for entry in &integrity.entries {
        let digest = entry.algorithm.digest(bytes);
        let computed_b64 = BASE64.encode(&digest);
        if computed_b64 == entry.digest_base64 {
            return VerifyOutcome::Ok;
        }
        if computed_for_report.is_empty() {
            computed_for_report = format!("{}-{computed_b64}", entry.algorithm.as_str());
        }
    }
    VerifyOutcome::Mismatch {
        computed: computed_for_report,
    }
}
