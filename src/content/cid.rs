//! Content identifiers for app-data documents pinned on IPFS.
//!
//! An app-data hash is a 32-byte digest. Depending on when the document was
//! created, it was pinned under one of two CIDv1 encodings, so a lookup has to
//! derive the identifier for each scheme and try them newest first.

use thiserror::Error;

/// CIDv1 encoding scheme of a 32-byte digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CidScheme {
    /// Raw codec over a keccak-256 digest. Used for all current documents.
    RawKeccak,
    /// dag-pb codec over a sha2-256 digest. Used by early documents.
    DagPbSha256,
}

impl CidScheme {
    /// Schemes in lookup order.
    pub const NEWEST_FIRST: [CidScheme; 2] = [CidScheme::RawKeccak, CidScheme::DagPbSha256];

    /// Version, codec, multihash code and digest length bytes.
    fn prefix(&self) -> [u8; 4] {
        match self {
            CidScheme::RawKeccak => [0x01, 0x55, 0x1b, 0x20],
            CidScheme::DagPbSha256 => [0x01, 0x70, 0x12, 0x20],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CidScheme::RawKeccak => "raw-keccak256",
            CidScheme::DagPbSha256 => "dagpb-sha256",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CidError {
    #[error("app hash is not valid hex: {0}")]
    InvalidHex(String),

    #[error("app hash must be 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A content identifier derived from an app-data hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cid {
    scheme: CidScheme,
    digest: [u8; 32],
}

impl Cid {
    /// Derive the identifier of `app_hash` (hex, with or without `0x`) under `scheme`.
    pub fn new(app_hash: &str, scheme: CidScheme) -> Result<Self, CidError> {
        let hex_digits = app_hash.strip_prefix("0x").unwrap_or(app_hash);
        let bytes = hex::decode(hex_digits).map_err(|_| CidError::InvalidHex(app_hash.into()))?;
        let digest: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CidError::InvalidLength(bytes.len()))?;
        Ok(Self { scheme, digest })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(36);
        bytes.extend_from_slice(&self.scheme.prefix());
        bytes.extend_from_slice(&self.digest);
        bytes
    }
}

/// Multibase base32 rendering: `b` prefix, lowercase RFC 4648 alphabet, no padding.
impl std::fmt::Display for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", base32_lower(&self.to_bytes()))
    }
}

/// Canonical form of an app hash: `0x` prefix and lowercase hex digits.
pub fn normalize_hash(app_hash: &str) -> String {
    let digits = app_hash
        .strip_prefix("0x")
        .or_else(|| app_hash.strip_prefix("0X"))
        .unwrap_or(app_hash);
    format!("0x{}", digits.to_ascii_lowercase())
}

fn base32_lower(data: &[u8]) -> String {
    const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";
    let mut result = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u64 = 0;
    let mut bits_left: u32 = 0;

    for &byte in data {
        buffer = (buffer << 8) | byte as u64;
        bits_left += 8;
        while bits_left >= 5 {
            bits_left -= 5;
            let index = ((buffer >> bits_left) & 0x1F) as usize;
            result.push(ALPHABET[index] as char);
        }
    }
    if bits_left > 0 {
        let index = ((buffer << (5 - bits_left)) & 0x1F) as usize;
        result.push(ALPHABET[index] as char);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0x3d876de8fcd70969349c92d731eeb0482fe8667ceca075592b8785081d630b9a";

    #[test]
    fn test_raw_keccak_cid() {
        let cid = Cid::new(HASH, CidScheme::RawKeccak).unwrap();
        assert_eq!(
            cid.to_string(),
            "bafkrwib5q5w6r7gxbfutjhes24y65mcif7ugm7hmub2vsk4hqueb2yylti"
        );
    }

    #[test]
    fn test_dag_pb_cid() {
        let cid = Cid::new(HASH, CidScheme::DagPbSha256).unwrap();
        assert_eq!(
            cid.to_string(),
            "bafybeib5q5w6r7gxbfutjhes24y65mcif7ugm7hmub2vsk4hqueb2yylti"
        );
    }

    #[test]
    fn test_uppercase_hash_without_prefix() {
        let hash = "1FE7C5555B3F9C14FF7C60D90F15F1A5B11A0DA5B1E8AA043582A1B2E1058D0C";
        let legacy = Cid::new(hash, CidScheme::DagPbSha256).unwrap();
        assert_eq!(
            legacy.to_string(),
            "bafybeia747cvkwz7tqkp67da3ehrl4nfwena3jnr5cvainmcugzocbmnbq"
        );
        let newest = Cid::new(hash, CidScheme::RawKeccak).unwrap();
        assert_eq!(
            newest.to_string(),
            "bafkrwia747cvkwz7tqkp67da3ehrl4nfwena3jnr5cvainmcugzocbmnbq"
        );
    }

    #[test]
    fn test_zero_hash() {
        let hash = format!("0x{}", "00".repeat(32));
        let cid = Cid::new(&hash, CidScheme::RawKeccak).unwrap();
        assert_eq!(
            cid.to_string(),
            "bafkrwiaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert_eq!(cid.scheme, CidScheme::RawKeccak);
    }

    #[test]
    fn test_invalid_hash() {
        assert_eq!(
            Cid::new("0xzz", CidScheme::RawKeccak),
            Err(CidError::InvalidHex("0xzz".into()))
        );
        assert_eq!(
            Cid::new("0xabcd", CidScheme::RawKeccak),
            Err(CidError::InvalidLength(2))
        );
    }

    #[test]
    fn test_newest_scheme_first() {
        assert_eq!(CidScheme::NEWEST_FIRST[0], CidScheme::RawKeccak);
    }

    #[test]
    fn test_normalize_hash() {
        assert_eq!(normalize_hash("0xABcd"), "0xabcd");
        assert_eq!(normalize_hash("ABCD"), "0xabcd");
        assert_eq!(normalize_hash("0XAB"), "0xab");
    }
}
