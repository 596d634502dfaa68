//! Heat-recovery efficiency.
//!
//! ```text
//! efficiency = clamp((T2 - T1) / (T3 - T1) * 100, 0, 100)
//! ```
//!
//! i.e. how much of the temperature difference between extract air and
//! outdoor air the exchanger recovers into the supply air.  When T3 equals
//! T1 there is nothing to recover and the result is `0`.
//!
//! # Example
//!
//! ```rust
//! use heatex_runtime::efficiency::efficiency;
//! use heatex_types::Reading;
//!
//! let eff = efficiency(&Reading::new(0.0, 15.0, 20.0, 5.0));
//! assert!((eff - 75.0).abs() < 1e-9);
//! ```

use heatex_types::Reading;

pub const MIN_EFFICIENCY: f64 = 0.0;
pub const MAX_EFFICIENCY: f64 = 100.0;

/// Supply-air temperature efficiency in percent, clamped to `[0, 100]`.
pub fn efficiency(reading: &Reading) -> f64 {
    let span = reading.t3_extract_air - reading.t1_outdoor_air_in;
    if span == 0.0 {
        return MIN_EFFICIENCY;
    }
    let raw = (reading.t2_supply_air - reading.t1_outdoor_air_in) / span * 100.0;
    if raw.is_nan() {
        return MIN_EFFICIENCY;
    }
    raw.clamp(MIN_EFFICIENCY, MAX_EFFICIENCY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_efficiency() {
        // (18 - 5) / (20 - 5) * 100
        let eff = efficiency(&Reading::BASELINE);
        assert!((eff - 86.666_666_666).abs() < 1e-6);
    }

    #[test]
    fn equal_extract_and_outdoor_is_zero() {
        assert_eq!(efficiency(&Reading::new(10.0, 15.0, 10.0, 8.0)), 0.0);
    }

    #[test]
    fn clamps_above_hundred() {
        assert_eq!(efficiency(&Reading::new(5.0, 30.0, 20.0, 8.0)), 100.0);
    }

    #[test]
    fn clamps_below_zero() {
        assert_eq!(efficiency(&Reading::new(5.0, 2.0, 20.0, 8.0)), 0.0);
    }

    #[test]
    fn inverted_span_is_clamped_not_rejected() {
        // T3 < T1 with T2 above T1: (25 - 20) / (10 - 20) is negative.
        assert_eq!(efficiency(&Reading::new(20.0, 25.0, 10.0, 8.0)), 0.0);
    }

    #[test]
    fn inverted_span_with_supply_between_is_a_plain_ratio() {
        // (15 - 20) / (10 - 20) * 100; both deltas negative.
        assert_eq!(efficiency(&Reading::new(20.0, 15.0, 10.0, 8.0)), 50.0);
    }

    #[test]
    fn exact_bounds_pass_through() {
        assert_eq!(efficiency(&Reading::new(0.0, 20.0, 20.0, 0.0)), 100.0);
        assert_eq!(efficiency(&Reading::new(0.0, 0.0, 20.0, 0.0)), 0.0);
    }

    #[test]
    fn result_always_in_range() {
        for t1 in [-20.0, 0.0, 5.0, 30.0] {
            for t2 in [-10.0, 5.0, 18.0, 40.0] {
                for t3 in [-20.0, 0.0, 20.0, 35.0] {
                    let eff = efficiency(&Reading::new(t1, t2, t3, 0.0));
                    assert!((0.0..=100.0).contains(&eff), "{t1} {t2} {t3} -> {eff}");
                }
            }
        }
    }
}
