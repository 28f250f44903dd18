//! Rolling name-censor codes shown to viewers in place of hidden names.
//!
//! The code is cosmetic: it re-rolls every tick so viewers cannot memorize a
//! stable placeholder, but it carries no information about the hidden name.

use rand::Rng;

use crate::consts::CENSOR_TICK_MS;

/// Characters a censor code cycles through.
pub const CENSOR_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of every censor code and seed.
pub const CENSOR_CODE_LEN: usize = 6;

/// The rolling six-character code for one token at one instant.
///
/// Each character starts at its seed character's alphabet position (or at a
/// position derived from the token id when the seed is missing or short) and
/// advances once per tick, offset per column so the characters do not move in
/// lockstep.
#[must_use]
pub fn rolling_label(seed: Option<&str>, token_id: u64, now_ms: i64) -> String {
    let len = CENSOR_ALPHABET.len() as i64;
    let tick = now_ms.div_euclid(CENSOR_TICK_MS);
    let seed_upper = seed.map(str::to_uppercase).unwrap_or_default();
    let seed_bytes = seed_upper.as_bytes();

    let mut out = String::with_capacity(CENSOR_CODE_LEN);
    for i in 0..CENSOR_CODE_LEN {
        let start = seed_bytes
            .get(i)
            .and_then(|ch| CENSOR_ALPHABET.iter().position(|a| a == ch))
            .map_or_else(
                || ((token_id as i64) * 7 + (i as i64) * 11).rem_euclid(len),
                |pos| pos as i64,
            );
        let idx = (start + tick + (i as i64) * 3).rem_euclid(len);
        out.push(CENSOR_ALPHABET[idx as usize] as char);
    }
    out
}

/// Generate a fresh six-character censor seed.
pub fn generate_seed<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CENSOR_CODE_LEN)
        .map(|_| CENSOR_ALPHABET[rng.random_range(0..CENSOR_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_six_chars_from_alphabet() {
        let code = rolling_label(Some("AB12CD"), 0, 1_000_000);
        assert_eq!(code.len(), CENSOR_CODE_LEN);
        assert!(code.bytes().all(|b| CENSOR_ALPHABET.contains(&b)));
    }

    #[test]
    fn code_advances_every_tick() {
        let a = rolling_label(Some("AB12CD"), 0, 0);
        let b = rolling_label(Some("AB12CD"), 0, 60);
        assert_ne!(a, b);
        // Same tick, same code.
        let c = rolling_label(Some("AB12CD"), 0, 59);
        assert_eq!(a, c);
    }

    #[test]
    fn seed_sets_the_starting_positions() {
        // At tick 0 with per-column offset i*3, seed "AAAAAA" yields the
        // alphabet at positions 0, 3, 6, ...
        let code = rolling_label(Some("AAAAAA"), 0, 0);
        assert_eq!(code, "ADGJMP");
    }

    #[test]
    fn missing_seed_falls_back_to_token_id() {
        let a = rolling_label(None, 1, 0);
        let b = rolling_label(None, 2, 0);
        assert_ne!(a, b);
        // Short seeds fall back per missing column, deterministically.
        let c = rolling_label(Some("AB"), 1, 0);
        assert_eq!(&c[..2], &rolling_label(Some("AB12CD"), 1, 0)[..2]);
    }

    #[test]
    fn negative_time_never_panics() {
        let code = rolling_label(None, 3, -12_345);
        assert_eq!(code.len(), CENSOR_CODE_LEN);
    }

    #[test]
    fn generated_seed_is_valid() {
        let mut rng = rand::rng();
        for _ in 0..32 {
            let seed = generate_seed(&mut rng);
            assert_eq!(seed.len(), CENSOR_CODE_LEN);
            assert!(seed.bytes().all(|b| CENSOR_ALPHABET.contains(&b)));
        }
    }
}
