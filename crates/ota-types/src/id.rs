use rand::Rng;
use sha2::{Digest, Sha256};

/// Characters used for generated identifiers.
///
/// Never contains the key delimiter (`' '`) or the leaf marker (`'*'`), so a
/// generated id is always a valid key component.
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_-";

/// Length of a generated identifier.
pub const ID_LEN: usize = 10;

/// Generate a short random identifier for a new entity.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Lower-case hex SHA-256 digest of a string.
///
/// Access-key names are only ever persisted in this form.
pub fn hash_sha256(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_fixed_length() {
        let id = generate_id();
        assert_eq!(id.len(), ID_LEN);
    }

    #[test]
    fn generated_ids_avoid_reserved_characters() {
        for _ in 0..200 {
            let id = generate_id();
            assert!(!id.contains(' '));
            assert!(!id.contains('*'));
        }
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hash_sha256(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }
}
