//! Simple moving-average crossover.

use serde::{Deserialize, Serialize};
use std::fmt;
use trendbot_core::{Bar, Price, Signal};

/// Why a series could not produce a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Insufficiency {
    /// Fewer samples than the window length.
    TooFewSamples { available: usize, required: usize },
    /// Window length of zero; no average is defined.
    ZeroWindow,
    /// Batch timed out before the series completed.
    NotCompleted,
}

impl fmt::Display for Insufficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewSamples {
                available,
                required,
            } => write!(f, "insufficient data: {available} of {required} samples"),
            Self::ZeroWindow => write!(f, "insufficient data: zero-length window"),
            Self::NotCompleted => write!(f, "insufficient data: series never completed"),
        }
    }
}

/// Outcome of one crossover evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEvaluation {
    pub signal: Signal,
    /// Close of the last sample.
    pub last_close: Option<Price>,
    /// Simple average of the trailing window ending at the last sample.
    pub moving_average: Option<Price>,
    /// Set when the signal defaulted to FLAT for lack of data.
    pub insufficiency: Option<Insufficiency>,
}

impl SignalEvaluation {
    /// FLAT with the given annotation.
    pub fn insufficient(reason: Insufficiency, last_close: Option<Price>) -> Self {
        Self {
            signal: Signal::Flat,
            last_close,
            moving_average: None,
            insufficiency: Some(reason),
        }
    }

    pub fn is_insufficient(&self) -> bool {
        self.insufficiency.is_some()
    }
}

/// Evaluate the crossover for a frozen series.
///
/// LONG iff `last_close > SMA(window)` over the trailing `window` bars.
/// Equality is FLAT. Fewer than `window` bars (including an empty series)
/// is FLAT with an [`Insufficiency`] annotation.
pub fn evaluate_crossover(bars: &[Bar], window: usize) -> SignalEvaluation {
    let last_close = bars.last().map(|b| b.close);

    if window == 0 {
        return SignalEvaluation::insufficient(Insufficiency::ZeroWindow, last_close);
    }
    if bars.len() < window {
        return SignalEvaluation::insufficient(
            Insufficiency::TooFewSamples {
                available: bars.len(),
                required: window,
            },
            last_close,
        );
    }

    let trailing: Vec<Price> = bars[bars.len() - window..].iter().map(|b| b.close).collect();
    let (Some(close), Some(average)) = (last_close, Price::mean(&trailing)) else {
        return SignalEvaluation::insufficient(
            Insufficiency::TooFewSamples {
                available: bars.len(),
                required: window,
            },
            last_close,
        );
    };

    let signal = if close > average {
        Signal::Long
    } else {
        Signal::Flat
    };

    SignalEvaluation {
        signal,
        last_close: Some(close),
        moving_average: Some(average),
        insufficiency: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn series(closes: &[Decimal]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                Bar::new(
                    NaiveDate::from_ymd_opt(2024, 3, 1 + i as u32).unwrap(),
                    Price::new(*close),
                )
            })
            .collect()
    }

    #[test]
    fn test_falling_last_close_is_flat() {
        // last=9 < avg(12, 9)=10.5
        let eval = evaluate_crossover(&series(&[dec!(10), dec!(12), dec!(9)]), 2);
        assert_eq!(eval.signal, Signal::Flat);
        assert_eq!(eval.moving_average, Some(Price::new(dec!(10.5))));
        assert!(!eval.is_insufficient());
    }

    #[test]
    fn test_rising_last_close_is_long() {
        // last=14 > avg(12, 14)=13
        let eval = evaluate_crossover(&series(&[dec!(10), dec!(12), dec!(14)]), 2);
        assert_eq!(eval.signal, Signal::Long);
        assert_eq!(eval.last_close, Some(Price::new(dec!(14))));
        assert_eq!(eval.moving_average, Some(Price::new(dec!(13))));
    }

    #[test]
    fn test_equality_is_flat() {
        let eval = evaluate_crossover(&series(&[dec!(5), dec!(7), dec!(7)]), 2);
        assert_eq!(eval.moving_average, Some(Price::new(dec!(7))));
        assert_eq!(eval.signal, Signal::Flat);

        // Flat line: every window average equals the close
        let eval = evaluate_crossover(&series(&[dec!(3); 5]), 5);
        assert_eq!(eval.signal, Signal::Flat);
        assert!(!eval.is_insufficient());
    }

    #[test]
    fn test_single_sample_is_insufficient() {
        let eval = evaluate_crossover(&series(&[dec!(50)]), 2);
        assert_eq!(eval.signal, Signal::Flat);
        assert_eq!(
            eval.insufficiency,
            Some(Insufficiency::TooFewSamples {
                available: 1,
                required: 2
            })
        );
        assert_eq!(eval.last_close, Some(Price::new(dec!(50))));
    }

    #[test]
    fn test_empty_series_is_insufficient() {
        let eval = evaluate_crossover(&[], 3);
        assert_eq!(eval.signal, Signal::Flat);
        assert_eq!(eval.last_close, None);
        assert!(eval.is_insufficient());
    }

    #[test]
    fn test_zero_window_is_insufficient() {
        let eval = evaluate_crossover(&series(&[dec!(1), dec!(2)]), 0);
        assert_eq!(eval.insufficiency, Some(Insufficiency::ZeroWindow));
        assert_eq!(eval.signal, Signal::Flat);
    }

    #[test]
    fn test_window_equal_to_length_uses_all_bars() {
        // avg(1, 2, 6) = 3 < 6
        let eval = evaluate_crossover(&series(&[dec!(1), dec!(2), dec!(6)]), 3);
        assert_eq!(eval.moving_average, Some(Price::new(dec!(3))));
        assert_eq!(eval.signal, Signal::Long);
    }

    #[test]
    fn test_only_trailing_window_counts() {
        // Early spike outside the window must not affect the average
        let eval = evaluate_crossover(
            &series(&[dec!(1000), dec!(10), dec!(11), dec!(12)]),
            3,
        );
        assert_eq!(eval.moving_average, Some(Price::new(dec!(11))));
        assert_eq!(eval.signal, Signal::Long);
    }

    #[test]
    fn test_deterministic() {
        let bars = series(&[dec!(10), dec!(12), dec!(14), dec!(13)]);
        assert_eq!(evaluate_crossover(&bars, 3), evaluate_crossover(&bars, 3));
    }

    #[test]
    fn test_insufficiency_display() {
        let reason = Insufficiency::TooFewSamples {
            available: 1,
            required: 200,
        };
        assert_eq!(reason.to_string(), "insufficient data: 1 of 200 samples");
    }
}
