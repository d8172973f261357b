// =============================================================================
// Wilder running average
// =============================================================================
//
// Several indicators (RSI, ADX) smooth a sample stream the same way: the
// first `period` samples seed the average with their mean, after which each
// sample nudges the running value by 1/period of its distance:
//
//   avg' = avg + (sample - avg) / period
//
// The accumulator yields `None` until the seed window fills, so callers can
// align derived series without index bookkeeping.
// =============================================================================

/// Streaming Wilder-smoothed average over a fixed period.
#[derive(Debug, Clone)]
pub struct WilderAverage {
    period: f64,
    seed_remaining: usize,
    seed_sum: f64,
    value: Option<f64>,
}

impl WilderAverage {
    /// `period` must be non-zero; a zero period never produces a value.
    pub fn new(period: usize) -> Self {
        Self {
            period: period as f64,
            seed_remaining: period,
            seed_sum: 0.0,
            value: None,
        }
    }

    /// Feed one sample; returns the smoothed value once the seed window has
    /// filled, `None` before that.
    pub fn update(&mut self, sample: f64) -> Option<f64> {
        match self.value {
            Some(current) => {
                let next = current + (sample - current) / self.period;
                self.value = Some(next);
                Some(next)
            }
            None => {
                if self.seed_remaining == 0 {
                    // period == 0: permanently dry.
                    return None;
                }
                self.seed_sum += sample;
                self.seed_remaining -= 1;
                if self.seed_remaining == 0 {
                    let seeded = self.seed_sum / self.period;
                    self.value = Some(seeded);
                    Some(seeded)
                } else {
                    None
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_until_seed_window_fills() {
        let mut avg = WilderAverage::new(4);
        assert!(avg.update(2.0).is_none());
        assert!(avg.update(4.0).is_none());
        assert!(avg.update(6.0).is_none());
        // Fourth sample completes the seed: mean of the window.
        assert_eq!(avg.update(8.0), Some(5.0));
    }

    #[test]
    fn recursion_after_seed() {
        let mut avg = WilderAverage::new(2);
        avg.update(1.0);
        let seeded = avg.update(3.0).unwrap(); // (1+3)/2 = 2
        assert!((seeded - 2.0).abs() < 1e-12);

        // 2 + (6-2)/2 = 4
        assert!((avg.update(6.0).unwrap() - 4.0).abs() < 1e-12);
        // 4 + (0-4)/2 = 2
        assert!((avg.update(0.0).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn constant_stream_is_a_fixed_point() {
        let mut avg = WilderAverage::new(5);
        for _ in 0..20 {
            if let Some(v) = avg.update(7.5) {
                assert!((v - 7.5).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn zero_period_never_yields() {
        let mut avg = WilderAverage::new(0);
        for _ in 0..5 {
            assert!(avg.update(1.0).is_none());
        }
    }

    #[test]
    fn converges_toward_new_level() {
        // After a level shift the average approaches the new level from the
        // old one without overshooting.
        let mut avg = WilderAverage::new(3);
        for _ in 0..3 {
            avg.update(0.0);
        }
        let mut last = 0.0;
        for _ in 0..40 {
            last = avg.update(9.0).unwrap();
            assert!(last <= 9.0 + 1e-12);
        }
        assert!((last - 9.0).abs() < 1e-3);
    }
}
