// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use rand::Rng;

/// Normalises a coach-variant selector: lowercases and replaces spaces with
/// underscores. Used both to match `RVC_COACH_MODEL`/`coach_model` against
/// mapping filenames and to parse `coach_info` out of a filename stem.
pub fn normalize_coach_model(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// Applies +/- `pct` random jitter to `base`, so that many independent
/// discovery loops waking on the same nominal interval don't all hit the
/// bus in the same tick.
pub fn jitter(base: Duration, pct: f64) -> Duration {
    let pct = pct.clamp(0.0, 1.0);
    let factor = 1.0 + rand::rng().random_range(-pct..=pct);
    Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
}

/// Formats a `u32` DGN as an upper-case hex string with no leading zeros,
/// matching the canonical `pgn_hex`/`dgn_hex` key form used throughout the
/// spec catalogue and coach mapping.
pub fn dgn_to_hex(dgn: u32) -> String {
    format!("{dgn:X}")
}

/// Parses a hex string (with or without a `0x` prefix) into a `u32`.
pub fn parse_hex_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    let s = s.trim();
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u32::from_str_radix(s, 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_model_names() {
        assert_eq!(
            normalize_coach_model("2021_Entegra_Aspire_44R"),
            "2021_entegra_aspire_44r"
        );
        assert_eq!(normalize_coach_model("My Coach Model"), "my_coach_model");
    }

    #[test]
    fn parses_hex_with_and_without_prefix() {
        assert_eq!(parse_hex_u32("1FEDA").expect("parse"), 0x1FEDA);
        assert_eq!(parse_hex_u32("0x1FEDA").expect("parse"), 0x1FEDA);
    }

    #[test]
    fn jitter_stays_non_negative_and_bounded() {
        let base = Duration::from_secs(30);
        for _ in 0..100 {
            let j = jitter(base, 0.1);
            assert!(j.as_secs_f64() >= 27.0 - 0.001);
            assert!(j.as_secs_f64() <= 33.0 + 0.001);
        }
    }

    #[test]
    fn dgn_to_hex_matches_canonical_form() {
        assert_eq!(dgn_to_hex(0x1FEDA), "1FEDA");
    }
}
