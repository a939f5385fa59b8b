//! Signal-to-order reconciliation.
//!
//! | Signal | Owned | Action |
//! |--------|-------|--------|
//! | LONG   | false | BUY `floor(capital / last_close)` |
//! | LONG   | true  | none |
//! | FLAT   | true  | SELL the instrument's configured sell quantity |
//! | FLAT   | false | none |
//!
//! A BUY that floors to zero shares is skipped and reported, never emitted.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};
use trendbot_core::{Instrument, OrderAction, Price, Quantity, Signal, Symbol};
use trendbot_signal::SignalEvaluation;

use crate::ownership::OwnershipBook;

/// One order to place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDecision {
    pub instrument: Instrument,
    pub action: OrderAction,
    pub quantity: Quantity,
    /// Close the quantity was sized from (BUY only).
    pub reference_price: Option<Price>,
}

impl OrderDecision {
    pub fn symbol(&self) -> &Symbol {
        &self.instrument.symbol
    }
}

/// Why a BUY was not emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Allocation buys less than one share.
    ZeroQuantity { capital: Decimal, last_close: Price },
    /// LONG without a usable last close.
    NoReferencePrice,
}

/// A decision the table called for but that was suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDecision {
    pub symbol: Symbol,
    pub action: OrderAction,
    pub reason: SkipReason,
}

/// Decisions in catalog order plus suppressed ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub decisions: Vec<OrderDecision>,
    pub skipped: Vec<SkippedDecision>,
}

/// Compares target signals against the ownership book.
#[derive(Debug, Clone)]
pub struct PositionReconciler {
    book: Arc<OwnershipBook>,
}

impl PositionReconciler {
    pub fn new(book: Arc<OwnershipBook>) -> Self {
        Self { book }
    }

    pub fn book(&self) -> &Arc<OwnershipBook> {
        &self.book
    }

    /// Apply the decision table to each (instrument, evaluation) pair.
    ///
    /// Reads ownership only; the dispatcher performs the flips.
    pub fn reconcile<'a>(
        &self,
        entries: impl IntoIterator<Item = (&'a Instrument, &'a SignalEvaluation)>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        for (instrument, eval) in entries {
            let symbol = &instrument.symbol;
            let owned = self.book.is_owned(symbol);

            match (eval.signal, owned) {
                (Signal::Long, false) => match buy_quantity(instrument, eval) {
                    Ok((quantity, price)) => {
                        info!(%symbol, %quantity, last_close = %price, "BUY decided");
                        outcome.decisions.push(OrderDecision {
                            instrument: instrument.clone(),
                            action: OrderAction::Buy,
                            quantity,
                            reference_price: Some(price),
                        });
                    }
                    Err(reason) => {
                        warn!(%symbol, ?reason, "BUY skipped");
                        outcome.skipped.push(SkippedDecision {
                            symbol: symbol.clone(),
                            action: OrderAction::Buy,
                            reason,
                        });
                    }
                },
                (Signal::Flat, true) => {
                    info!(%symbol, quantity = %instrument.sell_quantity, "SELL decided");
                    outcome.decisions.push(OrderDecision {
                        instrument: instrument.clone(),
                        action: OrderAction::Sell,
                        quantity: instrument.sell_quantity,
                        reference_price: None,
                    });
                }
                (signal, owned) => {
                    debug!(%symbol, %signal, owned, "No action");
                }
            }
        }

        outcome
    }
}

fn buy_quantity(
    instrument: &Instrument,
    eval: &SignalEvaluation,
) -> Result<(Quantity, Price), SkipReason> {
    let price = eval
        .last_close
        .filter(|p| p.is_positive())
        .ok_or(SkipReason::NoReferencePrice)?;

    let quantity = Quantity::affordable(instrument.capital, price);
    if !quantity.is_positive() {
        return Err(SkipReason::ZeroQuantity {
            capital: instrument.capital,
            last_close: price,
        });
    }
    Ok((quantity, price))
}
