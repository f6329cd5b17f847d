//! TON address normalization
//!
//! The indexer reports accounts either in raw form (`0:ab12...`) or in the
//! user-friendly base64 form (`EQ...` / `UQ...`). Every map in the engine is
//! keyed by the raw form so both spellings of one account collide.
//!
//! User-friendly layout (36 bytes once decoded):
//! - 1 byte: flags (bounceable / testnet)
//! - 1 byte: workchain id (signed)
//! - 32 bytes: account hash
//! - 2 bytes: CRC16 checksum (not verified here)

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use tracing::debug;

const FRIENDLY_LEN: usize = 36;

/// Result of normalizing an address string.
///
/// `key` is always populated. When `is_canonical` is false the input could
/// not be decoded and `key` is just the lower-cased input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalAddress {
    pub key: String,
    pub is_canonical: bool,
}

impl CanonicalAddress {
    fn fallback(input: &str) -> Self {
        Self {
            key: input.to_lowercase(),
            is_canonical: false,
        }
    }
}

impl fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Normalize an address to `"<workchain>:<lowercase hex>"`. Never fails.
pub fn canonicalize(address: &str) -> CanonicalAddress {
    if address.is_empty() {
        return CanonicalAddress {
            key: String::new(),
            is_canonical: false,
        };
    }

    if let Some((workchain, hash)) = split_raw(address) {
        return CanonicalAddress {
            key: format!("{}:{}", workchain, hash.to_lowercase()),
            is_canonical: true,
        };
    }

    let standard: String = address
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    let decoded = match STANDARD.decode(standard.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Address {} is not base64 ({}), keeping as-is", address, e);
            return CanonicalAddress::fallback(address);
        }
    };

    if decoded.len() != FRIENDLY_LEN {
        debug!(
            "Address {} decodes to {} bytes (expected {})",
            address,
            decoded.len(),
            FRIENDLY_LEN
        );
        return CanonicalAddress::fallback(address);
    }

    let workchain = decoded[1] as i8;
    CanonicalAddress {
        key: format!("{}:{}", workchain, hex::encode(&decoded[2..34])),
        is_canonical: true,
    }
}

/// Shorthand used when only the map key is needed
pub fn canonical_key(address: &str) -> String {
    canonicalize(address).key
}

/// Splits `"<signed int>:<rest>"`. The hash half is not validated, which
/// mirrors how the indexer's own raw strings are accepted.
fn split_raw(address: &str) -> Option<(&str, &str)> {
    let (workchain, hash) = address.split_once(':')?;
    let digits = workchain.strip_prefix('-').unwrap_or(workchain);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((workchain, hash))
}

/// First characters of an address, for log lines
pub fn short(address: &str) -> &str {
    address.get(..12).unwrap_or(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRIENDLY: &str = "EQBGtsm26tdn6bRjZrmLZkZMqk-K8wd4R66k52ntPU4UzcV0";
    const RAW: &str = "0:46b6c9b6ead767e9b46366b98b66464caa4f8af3077847aea4e769ed3d4e14cd";

    #[test]
    fn test_friendly_and_raw_agree() {
        let a = canonicalize(FRIENDLY);
        let b = canonicalize(RAW);
        assert!(a.is_canonical);
        assert!(b.is_canonical);
        assert_eq!(a.key, RAW);
        assert_eq!(a, b);
    }

    #[test]
    fn test_raw_hex_is_lowercased() {
        let upper = RAW.to_uppercase();
        assert_eq!(canonical_key(&upper), RAW);
    }

    #[test]
    fn test_masterchain_workchain() {
        let mut bytes = vec![0x11u8, 0xff];
        bytes.extend_from_slice(&[0xab; 32]);
        bytes.extend_from_slice(&[0, 0]);
        let friendly = STANDARD.encode(&bytes).replace('+', "-").replace('/', "_");

        let canonical = canonicalize(&friendly);
        assert!(canonical.is_canonical);
        assert_eq!(canonical.key, format!("-1:{}", "ab".repeat(32)));
    }

    #[test]
    fn test_malformed_falls_back_to_lowercase_echo() {
        let c = canonicalize("NotAnAddress!!");
        assert!(!c.is_canonical);
        assert_eq!(c.key, "notanaddress!!");

        // valid base64, wrong length
        let c = canonicalize("QUJDRA==");
        assert!(!c.is_canonical);
        assert_eq!(c.key, "qujdra==");
    }

    #[test]
    fn test_idempotent() {
        for input in [FRIENDLY, RAW, "NotAnAddress!!", "-1:ABCDEF", "", "UQ__"] {
            let once = canonical_key(input);
            assert_eq!(canonical_key(&once), once, "input {input}");
        }
    }
}
