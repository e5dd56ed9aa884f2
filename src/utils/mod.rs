pub mod config;

const PASSWORD_CONTEXT: &str = "timetables 2024-01 account password";

/// Salted BLAKE3 derived key, hex encoded.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(PASSWORD_CONTEXT);
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().to_hex().to_string()
}

pub fn verify_password(salt: &str, password: &str, stored_hex: &str) -> bool {
    let Ok(stored) = blake3::Hash::from_hex(stored_hex) else {
        return false;
    };
    let mut hasher = blake3::Hasher::new_derive_key(PASSWORD_CONTEXT);
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    // blake3::Hash equality is constant time
    hasher.finalize() == stored
}

/// Bearer tokens are only ever persisted through this hash.
pub fn hash_token(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

pub fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
