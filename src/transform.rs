// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Value transforms applied before publishing
//!
//! - Direction transforms split a signed power flow into two non-negative
//!   fields (import / export).
//! - Name normalization turns human field names into stable payload keys.

use std::fmt;

/// Direction selector of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Keep the positive part: `max(v, 0)`
    In,
    /// Keep the magnitude of the negative part: `abs(min(v, 0))`
    Out,
    /// Publish the value unchanged
    #[default]
    None,
}

impl Direction {
    /// Parse the configuration spelling. Anything but `in`/`out` is `None`.
    pub fn from_config(value: &str) -> Self {
        match value {
            "in" => Direction::In,
            "out" => Direction::Out,
            _ => Direction::None,
        }
    }

    /// Apply the transform to a decoded value
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Direction::In => value.max(0.0),
            Direction::Out => value.min(0.0).abs(),
            Direction::None => value,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
            Direction::None => write!(f, "none"),
        }
    }
}

/// Normalize a field name into a payload key
///
/// Lowercases every character and maps `[`, `]` and whitespace to `_`.
/// Every other character passes through.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '[' || c == ']' || c.is_whitespace() {
            out.push('_');
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_direction_from_config() {
        assert_eq!(Direction::from_config("in"), Direction::In);
        assert_eq!(Direction::from_config("out"), Direction::Out);
        assert_eq!(Direction::from_config(""), Direction::None);
        assert_eq!(Direction::from_config("IN"), Direction::None);
    }

    #[test]
    fn test_direction_apply_signed_flow() {
        assert_eq!(Direction::In.apply(-150.0), 0.0);
        assert_eq!(Direction::Out.apply(-150.0), 150.0);
        assert_eq!(Direction::In.apply(42.5), 42.5);
        assert_eq!(Direction::Out.apply(42.5), 0.0);
        assert_eq!(Direction::None.apply(-7.0), -7.0);
    }

    #[test]
    fn test_direction_out_zero_is_positive_zero() {
        let v = Direction::Out.apply(0.0);
        assert_eq!(v, 0.0);
        assert!(v.is_sign_positive());
    }

    #[test]
    fn test_normalize_examples() {
        assert_eq!(normalize_name("Battery [1]"), "battery__1_");
        assert_eq!(normalize_name("Grid In"), "grid_in");
        assert_eq!(normalize_name("Cell\tVoltage\nMin"), "cell_voltage_min");
        assert_eq!(normalize_name("soc"), "soc");
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("Temp.°C-%"), "temp.°c-%");
    }

    proptest! {
        #[test]
        fn prop_in_is_identity_on_non_negative(v in 0.0f64..1.0e9) {
            prop_assert_eq!(Direction::In.apply(v), v);
        }

        #[test]
        fn prop_in_clamps_negative(v in -1.0e9f64..-1.0e-9) {
            prop_assert_eq!(Direction::In.apply(v), 0.0);
        }

        #[test]
        fn prop_out_negates_non_positive(v in -1.0e9f64..=0.0) {
            prop_assert_eq!(Direction::Out.apply(v), -v);
        }

        #[test]
        fn prop_out_clamps_positive(v in 1.0e-9f64..1.0e9) {
            prop_assert_eq!(Direction::Out.apply(v), 0.0);
        }

        #[test]
        fn prop_normalize_is_idempotent(s in "[a-zA-Z0-9 _\\[\\]\\t.%°ÄÖÜäöü/-]{0,40}") {
            let once = normalize_name(&s);
            prop_assert_eq!(normalize_name(&once), once.clone());
            prop_assert!(!once.contains('['));
            prop_assert!(!once.contains(']'));
            prop_assert!(!once.chars().any(char::is_whitespace));
        }
    }
}
