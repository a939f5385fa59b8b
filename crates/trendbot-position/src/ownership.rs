//! Per-instrument ownership state.
//!
//! Two writers touch this map: the control flow (optimistic flips and
//! rollbacks at submission) and the gateway's I/O task (execution
//! corrections). DashMap shards keep each update atomic per symbol.

use std::collections::BTreeMap;

use dashmap::DashMap;
use tracing::{debug, info};
use trendbot_core::{ExecutionSide, Symbol};

/// Symbol -> held.
///
/// Unknown symbols read as not held. State lives for the session only.
#[derive(Debug, Default)]
pub struct OwnershipBook {
    owned: DashMap<Symbol, bool>,
}

impl OwnershipBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book from initial holdings.
    pub fn seeded(initial: impl IntoIterator<Item = (Symbol, bool)>) -> Self {
        let book = Self::new();
        for (symbol, owned) in initial {
            book.owned.insert(symbol, owned);
        }
        book
    }

    pub fn is_owned(&self, symbol: &Symbol) -> bool {
        self.owned.get(symbol).is_some_and(|entry| *entry)
    }

    /// Set ownership, returning the previous value.
    pub fn set(&self, symbol: &Symbol, owned: bool) -> bool {
        let previous = self.owned.insert(symbol.clone(), owned).unwrap_or(false);
        if previous != owned {
            debug!(%symbol, owned, "Ownership updated");
        }
        previous
    }

    /// Authoritative correction from an execution report.
    ///
    /// BOT marks the symbol held, SLD marks it not held. Returns the
    /// previous value.
    pub fn apply_execution(&self, symbol: &Symbol, side: ExecutionSide) -> bool {
        let owned = side.owned_after();
        let previous = self.owned.insert(symbol.clone(), owned).unwrap_or(false);
        if previous != owned {
            info!(%symbol, %side, owned, "Ownership corrected by execution");
        }
        previous
    }

    /// Sorted copy of the current state.
    pub fn snapshot(&self) -> BTreeMap<Symbol, bool> {
        self.owned
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}
