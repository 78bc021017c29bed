use rand::Rng;

/// Characters allowed in room codes (uppercase alphanumeric).
///
/// 36^6 ≈ 2.2 billion codes. Fine for casual joining, useless as a secret. Uniqueness among
/// waiting rooms is enforced by the backend only.
pub const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const ROOM_CODE_LENGTH: usize = 6;

/// Generate a random 6-character room code
#[must_use]
pub fn generate_room_code() -> String {
    generate_room_code_with(&mut rand::thread_rng())
}

/// Generate a room code from the given random source
pub fn generate_room_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..ROOM_CODE_CHARS.len());
            char::from(ROOM_CODE_CHARS[idx])
        })
        .collect()
}

/// Validate room code format (expects a normalized code)
#[must_use]
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LENGTH && code.bytes().all(|b| ROOM_CODE_CHARS.contains(&b))
}

/// Normalize room code (uppercase, trimmed)
#[must_use]
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_uppercase()
}
