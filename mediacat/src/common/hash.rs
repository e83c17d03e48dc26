use std::fmt;
use std::str::FromStr;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// A type-safe wrapper around a 256-bit digest.
///
/// Used for the content checksum of a file as well as for the derived
/// identities (`path_hash`, `name_hash`). It stores the 32 raw bytes and is
/// rendered as a 64 character lowercase hex string everywhere it leaves the
/// process (JSON, SQLite, logs).
//
// // 一个代表 256 位哈希值的类型安全包装器。
// // 内部存储 32 字节原始数据，对外统一编码为 64 字符的小写十六进制字符串。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CatalogHash([u8; 32]);

/// Errors that can occur when parsing a `CatalogHash` string.
#[derive(Debug, thiserror::Error)]
pub enum HashParseError {
    #[error("Invalid hex string length: expected 64, got {0}")]
    InvalidLength(usize),
    #[error("Hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl CatalogHash {
    /// Length of the hex text form.
    pub const HEX_LEN: usize = 64;

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// SHA-256 of a piece of text.
    ///
    /// This is how the derived identities are built: `path_hash` hashes
    /// `path + checksum`, `name_hash` hashes `path + "/" + name`.
    pub fn of_text(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        Self(digest.into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        if s.len() != Self::HEX_LEN {
            return Err(HashParseError::InvalidLength(s.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl From<[u8; 32]> for CatalogHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for CatalogHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for CatalogHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// --- Serde (JSON) ---

impl Serialize for CatalogHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CatalogHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CatalogHashVisitor;

        impl<'de> serde::de::Visitor<'de> for CatalogHashVisitor {
            type Value = CatalogHash;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a 64-character hex hash string")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                CatalogHash::from_str(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(CatalogHashVisitor)
    }
}

// --- SQLite ---

/// Stored as TEXT (hex string).
impl ToSql for CatalogHash {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(Value::Text(self.to_hex())))
    }
}

impl FromSql for CatalogHash {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()
            .and_then(|s| CatalogHash::from_str(s).map_err(|e| FromSqlError::Other(Box::new(e))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let hash = CatalogHash::new([0xAB; 32]);
        let text = hash.to_hex();
        assert_eq!(text.len(), CatalogHash::HEX_LEN);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(CatalogHash::from_str(&text).unwrap(), hash);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(matches!(
            CatalogHash::from_str("abcd"),
            Err(HashParseError::InvalidLength(4))
        ));
    }

    #[test]
    fn test_of_text_matches_known_sha256() {
        // sha256("abc")
        let hash = CatalogHash::of_text("abc");
        assert_eq!(
            hash.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_serde_json_is_plain_string() {
        let hash = CatalogHash::new([42; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json.len(), 64 + 2);
        let back: CatalogHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_rusqlite_roundtrip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let hash = CatalogHash::of_text("roundtrip");
        let back: CatalogHash = conn
            .query_row("SELECT ?1", [&hash], |row| row.get(0))
            .unwrap();
        assert_eq!(back, hash);
    }
}
