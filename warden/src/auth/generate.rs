//! Random secrets, synthetic passwords and username derivation.
//!
//! Everything here takes its randomness source as an argument so callers
//! can pass `rand::rng()` in production and a seeded RNG in tests.

use rand::{Rng, RngCore, seq::SliceRandom};

/// Maximum username length
pub const MAX_USERNAME_LENGTH: usize = 20;

/// Counter suffixes tried before falling back to a random suffix
pub const USERNAME_COUNTER_ATTEMPTS: u32 = 100;

/// Length of generated passwords for provider-created accounts
pub const GENERATED_PASSWORD_LENGTH: usize = 32;

/// Random bytes in an opaque one-time token
pub const OPAQUE_TOKEN_BYTES: usize = 32;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{}";

/// Hex-encoded random token for verification and reset links
pub fn opaque_token<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Strong random password containing every character class
pub fn strong_password<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    let classes = [LOWERCASE, UPPERCASE, DIGITS, SYMBOLS];
    let length = length.max(classes.len());
    let all: Vec<u8> = classes.concat();

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.random_range(0..class.len())])
        .collect();
    while chars.len() < length {
        chars.push(all[rng.random_range(0..all.len())]);
    }
    chars.shuffle(rng);

    chars.into_iter().map(char::from).collect()
}

/// Derive a username base from a display name.
///
/// Lowercases, replaces anything outside `[a-z0-9_]` with `_`, collapses
/// runs of `_`, trims `_` from both ends and truncates. Falls back to
/// `"user"` when nothing usable remains.
pub fn sanitize_username(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed: String = out
        .trim_matches('_')
        .chars()
        .take(MAX_USERNAME_LENGTH)
        .collect();
    let trimmed = trimmed.trim_end_matches('_');

    if trimmed.is_empty() {
        "user".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Username to try on the given collision attempt.
///
/// Attempt 0 is the base itself, attempts up to
/// [`USERNAME_COUNTER_ATTEMPTS`] append the counter, later attempts append a
/// random six-digit suffix. The base is shortened so the result always fits.
pub fn username_candidate<R: Rng + ?Sized>(base: &str, attempt: u32, rng: &mut R) -> String {
    if attempt == 0 {
        return base.to_string();
    }

    let suffix = if attempt <= USERNAME_COUNTER_ATTEMPTS {
        attempt.to_string()
    } else {
        format!("{:06}", rng.random_range(0..1_000_000u32))
    };

    let keep = MAX_USERNAME_LENGTH.saturating_sub(suffix.len());
    let prefix: String = base.chars().take(keep).collect();
    format!("{prefix}{suffix}")
}
