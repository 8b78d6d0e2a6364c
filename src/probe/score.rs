//! Latency-to-quality reduction.
//!
//! Application-level latency dominates perceived quality since it reflects
//! the full proxy path, so it carries most of the weight; TCP connect time
//! is a secondary signal; a small flat bonus rewards mere reachability over
//! complete failure regardless of how slow the endpoint is.

const TTFB_WEIGHT: f64 = 0.70;
const TCP_WEIGHT: f64 = 0.25;
const SUCCESS_BONUS: f64 = 0.05;

/// Reduces measured latencies to a quality score in `[0, 1]`.
///
/// Quick-probe callers have no TTFB measurement and pass `tcp_ms` for both
/// components; that is a deliberate approximation, not a separate formula.
pub fn score(ttfb_ms: u64, tcp_ms: u64, success: bool) -> f64 {
    if !success {
        return 0.0;
    }

    let weighted = TTFB_WEIGHT * utility(ttfb_ms) + TCP_WEIGHT * utility(tcp_ms) + SUCCESS_BONUS;
    weighted.clamp(0.0, 1.0)
}

/// `u(x) = 1 / (1 + x/100)`: 0 ms -> 1.0, 100 ms -> 0.5, asymptotic to 0.
fn utility(ms: u64) -> f64 {
    1.0 / (1.0 + (ms as f64) / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_scores_zero() {
        assert_eq!(score(0, 0, false), 0.0);
        assert_eq!(score(10, 10, false), 0.0);
    }

    #[test]
    fn test_instant_latency_scores_near_max() {
        let s = score(0, 0, true);
        assert!((s - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_slow_endpoint_scores_low() {
        // u(900) = 0.1: 0.70*0.1 + 0.25*0.1 + 0.05 = 0.145
        let s = score(900, 900, true);
        assert!((s - 0.145).abs() < 1e-9);
    }

    #[test]
    fn test_hundred_ms_utility_is_half() {
        let s = score(100, 100, true);
        assert!((s - (0.70 * 0.5 + 0.25 * 0.5 + 0.05)).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_monotonically_decreasing_in_latency() {
        let mut last = f64::MAX;
        for ms in [0, 10, 50, 100, 500, 1000, 10_000] {
            let s = score(ms, ms, true);
            assert!(s < last);
            last = s;
        }
    }

    #[test]
    fn test_score_stays_in_unit_interval() {
        for ms in [0u64, 1, 99, 100, 101, 100_000, u64::MAX / 1_000_000] {
            let s = score(ms, ms, true);
            assert!((0.0..=1.0).contains(&s));
        }
    }
}
