//! Referral code generation
//!
//! Uniqueness is enforced by the store (`UNIQUE (referral_code)`); this module
//! only draws candidates.

use rand::Rng;

/// No 0/O or 1/I, so codes survive being read aloud or retyped
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Canonical form of a code typed by a user
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}
