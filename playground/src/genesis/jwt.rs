//! Engine API JWT secret.

use std::path::Path;

use alloy_primitives::B256;
use rand::RngCore;

/// Generates a random 32-byte JWT secret.
pub fn random_jwt_secret() -> B256 {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    B256::from(bytes)
}

/// Writes a fresh secret to `path` as bare hex, the form both clients accept.
pub fn write_jwt_secret(path: &Path) -> std::io::Result<B256> {
    let secret = random_jwt_secret();
    std::fs::write(path, hex::encode(secret))?;
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_differ() {
        assert_ne!(random_jwt_secret(), random_jwt_secret());
    }

    #[test]
    fn test_written_without_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwt.hex");
        let secret = write_jwt_secret(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.len(), 64);
        assert!(!written.starts_with("0x"));
        assert_eq!(written, hex::encode(secret));
    }
}
