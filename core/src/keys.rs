use rand::Rng;
use thiserror::Error;

/// Length of a machine-group enrollment key.
pub const GROUP_KEY_LEN: usize = 128;
/// Length of an API key's public half.
pub const API_PUBLIC_KEY_LEN: usize = 24;
/// Length of an API key's private half.
pub const API_PRIVATE_KEY_LEN: usize = 64;

/// How many collision retries a caller should attempt before giving up.
/// Collisions are astronomically unlikely at these lengths; hitting this cap
/// means the randomness source or the uniqueness check is broken.
pub const MAX_KEY_ATTEMPTS: u32 = 10;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Raised when a key could not be persisted without collision within
/// [`MAX_KEY_ATTEMPTS`] tries. Operator-facing, not a per-request error.
#[derive(Debug, Error)]
#[error("key generation exhausted after {attempts} collision retries")]
pub struct KeyExhausted {
    pub attempts: u32,
}

/// Generate a random token of `len` characters drawn uniformly from
/// lowercase ASCII letters and digits. `thread_rng` is a CSPRNG.
pub fn generate_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Candidate machine-group key. Uniqueness is the caller's responsibility —
/// the storage layer checks against the machine_groups table and retries.
pub fn generate_group_key() -> String {
    generate_token(GROUP_KEY_LEN)
}

/// Candidate public half of an API key pair.
pub fn generate_api_public_key() -> String {
    generate_token(API_PUBLIC_KEY_LEN)
}

/// Private half of an API key pair. Not collision-checked: it is never used
/// as a lookup key on its own.
pub fn generate_api_private_key() -> String {
    generate_token(API_PRIVATE_KEY_LEN)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn tokens_have_requested_length() {
        assert_eq!(generate_group_key().len(), GROUP_KEY_LEN);
        assert_eq!(generate_api_public_key().len(), API_PUBLIC_KEY_LEN);
        assert_eq!(generate_api_private_key().len(), API_PRIVATE_KEY_LEN);
    }

    #[test]
    fn tokens_use_lowercase_alphanumeric_charset() {
        let token = generate_token(4096);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn group_keys_are_distinct_over_large_sample() {
        let keys: HashSet<String> = (0..10_000).map(|_| generate_group_key()).collect();
        assert_eq!(keys.len(), 10_000);
    }
}
