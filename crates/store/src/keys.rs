//! Content-addressed storage key generation.

use sha2::{Digest, Sha256};

/// Hex characters of the content hash kept in the key.
const HASH_LEN: usize = 16;

/// Build a storage key of the form `<prefix>/<hh>/<hash>-<nonce>.<ext>`
/// where `<hash>` is a truncated hex SHA-256 of the content, `<hh>` its
/// first two characters (fan-out directory), and `<nonce>` a caller-
/// supplied uniquifier.
///
/// The content hash makes blobs traceable to their bytes; the nonce keeps
/// keys unique so two uploads of identical content never share a blob
/// (deleting one must not orphan the other's record).
pub fn storage_key(prefix: &str, bytes: &[u8], nonce: &str, ext: &str) -> String {
    let digest = Sha256::digest(bytes);
    let hash = hex_string(&digest);
    format!("{prefix}/{}/{}-{nonce}.{ext}", &hash[..2], &hash[..HASH_LEN])
}

/// Validate a key before handing it to a provider: relative, slash
/// separated, no traversal components.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && !key.ends_with('/')
        && key.split('/').all(|part| {
            !part.is_empty() && part != "." && part != ".." && !part.contains('\\')
        })
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_hash_is_deterministic_for_same_content() {
        let a = storage_key("results", b"image-bytes", "n1", "png");
        let b = storage_key("results", b"image-bytes", "n2", "png");
        let hash_of = |k: &str| k.rsplit('/').next().unwrap().split('-').next().unwrap().to_string();
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn key_differs_per_content_and_prefix() {
        let a = storage_key("results", b"one", "n", "png");
        let b = storage_key("results", b"two", "n", "png");
        let c = storage_key("photos", b"one", "n", "png");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn key_shape_has_fanout_directory() {
        let key = storage_key("photos", b"x", "abc123", "jpg");
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "photos");
        assert_eq!(parts[1].len(), 2);
        assert!(parts[2].ends_with("-abc123.jpg"));
        assert!(parts[2].starts_with(parts[1]));
    }

    #[test]
    fn safe_key_accepts_generated_keys() {
        assert!(is_safe_key(&storage_key("templates", b"x", "n", "png")));
    }

    #[test]
    fn safe_key_rejects_traversal_and_absolute_paths() {
        assert!(!is_safe_key("../etc/passwd"));
        assert!(!is_safe_key("/absolute"));
        assert!(!is_safe_key("a//b"));
        assert!(!is_safe_key("a/./b"));
        assert!(!is_safe_key(""));
        assert!(!is_safe_key("a\\b"));
    }
}
