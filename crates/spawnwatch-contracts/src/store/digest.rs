use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowercase hex fingerprint of a normalized spawn image.
///
/// Equality is exact string equality; there is no notion of "close" digests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageDigest(String);

impl ImageDigest {
    pub fn from_bytes(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::ImageDigest;

    #[test]
    fn from_bytes_is_lowercase_hex() {
        let digest = ImageDigest::from_bytes(&[0xAB, 0x01, 0xff]);
        assert_eq!(digest.as_str(), "ab01ff");
        assert_eq!(digest.to_string(), "ab01ff");
    }

    #[test]
    fn serializes_as_plain_string() -> anyhow::Result<()> {
        let digest = ImageDigest::from_bytes(&[0x0f]);
        assert_eq!(serde_json::to_string(&digest)?, "\"0f\"");
        let parsed: ImageDigest = serde_json::from_str("\"0f\"")?;
        assert_eq!(parsed, digest);
        Ok(())
    }
}
