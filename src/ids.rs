//! Opaque tracker identifiers

/// URL-safe alphabet, 64 symbols (6 bits each)
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// 21 symbols * 6 bits = 126 bits of entropy
pub const TRACKER_ID_LEN: usize = 21;

/// Generate a new tracker identifier from the thread-local CSPRNG.
///
/// Uniqueness is not checked here; the primary key on `trackers.id` rejects
/// the (astronomically unlikely) duplicate.
pub fn new_tracker_id() -> String {
    std::iter::repeat_with(|| ALPHABET[rand::random_range(0..ALPHABET.len())] as char)
        .take(TRACKER_ID_LEN)
        .collect()
}
