/// Hex blake3 digest of a payload, used to identify fetched content in logs.
pub fn content_digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// First 12 hex characters of [`content_digest`].
pub fn short_digest(bytes: &[u8]) -> String {
    let mut hex = content_digest(bytes);
    hex.truncate(12);
    hex
}

#[cfg(test)]
mod tests {
    use super::{content_digest, short_digest};

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        assert_eq!(content_digest(b"tile"), content_digest(b"tile"));
        assert_ne!(content_digest(b"tile"), content_digest(b"tilf"));
        assert_eq!(content_digest(b"").len(), 64);
        assert!(content_digest(b"tile").starts_with(&short_digest(b"tile")));
        assert_eq!(short_digest(b"tile").len(), 12);
    }
}
