//! Per-instrument evaluation with audit logging.

use tracing::{debug, info, warn};
use trendbot_core::{Bar, Instrument, RequestId};

use crate::crossover::{evaluate_crossover, Insufficiency, SignalEvaluation};

/// Runs the crossover for each instrument of a batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalEngine;

impl SignalEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one instrument.
    ///
    /// `bars` is `None` when the series never completed (batch timeout);
    /// the instrument then resolves to FLAT.
    pub fn evaluate(
        &self,
        instrument: &Instrument,
        req_id: RequestId,
        bars: Option<&[Bar]>,
    ) -> SignalEvaluation {
        let Some(bars) = bars else {
            warn!(
                symbol = %instrument.symbol,
                %req_id,
                "Series never completed, defaulting to FLAT"
            );
            return SignalEvaluation::insufficient(Insufficiency::NotCompleted, None);
        };

        let eval = evaluate_crossover(bars, instrument.window);
        match eval.insufficiency {
            Some(reason) => warn!(
                symbol = %instrument.symbol,
                %req_id,
                samples = bars.len(),
                window = instrument.window,
                %reason,
                "Defaulting to FLAT"
            ),
            None => info!(
                symbol = %instrument.symbol,
                %req_id,
                signal = %eval.signal,
                last_close = ?eval.last_close,
                moving_average = ?eval.moving_average,
                "Signal computed"
            ),
        }
        debug!(symbol = %instrument.symbol, samples = bars.len(), "Crossover evaluated");
        eval
    }
}
