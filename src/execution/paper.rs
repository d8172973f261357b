// =============================================================================
// Paper Wallet — simulated cash and holdings
// =============================================================================
//
// Accounting contract:
//   - Opening a position deducts only the FEE from cash (the notional stays
//     as wallet balance; exposure is tracked through holdings).
//   - Closing deducts the fee and reduces holdings; realized PnL is applied
//     separately through `add_realized_pnl` once the caller has computed it.
//   - Short exposure is tracked under a "SHORT_" key prefix.
//
// Every mutation persists the full wallet to a JSON snapshot (atomic tmp +
// rename) so restarts recover cash and holdings exactly.
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::types::PositionSide;

/// Key prefix for short exposure in the holdings map.
pub const SHORT_PREFIX: &str = "SHORT_";

#[derive(Debug, Serialize, Deserialize)]
struct WalletSnapshot {
    cash: f64,
    holdings: HashMap<String, f64>,
}

/// Process-scoped simulated wallet. Callers wrap it in a single mutex that
/// also covers the snapshot file.
pub struct PaperWallet {
    cash: f64,
    holdings: HashMap<String, f64>,
    state_path: PathBuf,
}

impl PaperWallet {
    /// Open the wallet at `state_path`, restoring a previous snapshot when
    /// one exists; otherwise start with `starting_cash`.
    pub fn new(state_path: impl Into<PathBuf>, starting_cash: f64) -> Self {
        let state_path = state_path.into();
        let (cash, holdings) = match Self::load(&state_path) {
            Some(snapshot) => {
                info!(
                    cash = snapshot.cash,
                    holdings = snapshot.holdings.len(),
                    "paper wallet restored"
                );
                (snapshot.cash, snapshot.holdings)
            }
            None => (starting_cash, HashMap::new()),
        };
        Self {
            cash,
            holdings,
            state_path,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn holdings(&self) -> &HashMap<String, f64> {
        &self.holdings
    }

    fn holding_key(base: &str, side: PositionSide) -> String {
        match side {
            PositionSide::Long => base.to_string(),
            PositionSide::Short => format!("{SHORT_PREFIX}{base}"),
        }
    }

    /// Record an open: deduct the fee, credit holdings by `quantity`.
    ///
    /// Rejects when cash cannot cover the fee.
    pub fn open(
        &mut self,
        base: &str,
        side: PositionSide,
        quantity: f64,
        fee: f64,
    ) -> EngineResult<()> {
        if fee > self.cash {
            return Err(EngineError::InsufficientFunds(format!(
                "paper wallet cash {:.2} cannot cover fee {:.2}",
                self.cash, fee
            )));
        }

        self.cash -= fee;
        let key = Self::holding_key(base, side);
        *self.holdings.entry(key).or_insert(0.0) += quantity;
        self.persist();
        Ok(())
    }

    /// Record a close: deduct the fee, reduce holdings by `quantity`
    /// (clamped at zero). Realized PnL is applied separately.
    pub fn close(
        &mut self,
        base: &str,
        side: PositionSide,
        quantity: f64,
        fee: f64,
    ) -> EngineResult<()> {
        self.cash -= fee;
        let key = Self::holding_key(base, side);
        match self.holdings.get_mut(&key) {
            Some(held) => {
                *held = (*held - quantity).max(0.0);
                if *held <= 0.0 {
                    self.holdings.remove(&key);
                }
            }
            None => {
                warn!(base, side = %side, "paper close for an untracked holding");
            }
        }
        self.persist();
        Ok(())
    }

    /// Apply realized PnL to the cash balance.
    pub fn add_realized_pnl(&mut self, delta: f64) {
        self.cash += delta;
        self.persist();
        info!(delta, cash = self.cash, "paper realized pnl applied");
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    fn load(path: &Path) -> Option<WalletSnapshot> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<WalletSnapshot>(&content) {
            Ok(mut snapshot) => {
                snapshot.holdings.retain(|_, qty| *qty > 0.0);
                snapshot.cash = snapshot.cash.max(0.0);
                Some(snapshot)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "paper snapshot unreadable");
                None
            }
        }
    }

    fn persist(&self) {
        let snapshot = WalletSnapshot {
            cash: self.cash,
            holdings: self
                .holdings
                .iter()
                .filter(|(_, qty)| **qty > 0.0)
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        };
        let content = match serde_json::to_string(&snapshot) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "paper snapshot serialize failed");
                return;
            }
        };

        if let Some(parent) = self.state_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let tmp = self.state_path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp, &content) {
            warn!(error = %e, "paper snapshot write failed");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, &self.state_path) {
            warn!(error = %e, "paper snapshot rename failed");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("meridian-paper-{name}-{}.json", std::process::id()))
    }

    #[test]
    fn open_deducts_only_fee() {
        let path = temp_path("fee");
        let mut wallet = PaperWallet::new(&path, 1_000_000.0);
        wallet.open("BTC", PositionSide::Long, 0.01, 500.0).unwrap();

        assert!((wallet.cash() - 999_500.0).abs() < 1e-9);
        assert!((wallet.holdings()["BTC"] - 0.01).abs() < 1e-12);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn open_rejected_when_fee_exceeds_cash() {
        let path = temp_path("reject");
        let mut wallet = PaperWallet::new(&path, 100.0);
        let err = wallet
            .open("BTC", PositionSide::Long, 1.0, 500.0)
            .unwrap_err();
        assert_eq!(err.kind(), "insufficient_funds");
        assert!((wallet.cash() - 100.0).abs() < 1e-12);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn short_holdings_use_prefix() {
        let path = temp_path("short");
        let mut wallet = PaperWallet::new(&path, 10_000.0);
        wallet.open("ETH", PositionSide::Short, 2.0, 10.0).unwrap();
        assert!((wallet.holdings()["SHORT_ETH"] - 2.0).abs() < 1e-12);
        assert!(!wallet.holdings().contains_key("ETH"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn close_reduces_and_evicts_zero_holdings() {
        let path = temp_path("close");
        let mut wallet = PaperWallet::new(&path, 10_000.0);
        wallet.open("BTC", PositionSide::Long, 1.0, 5.0).unwrap();
        wallet.close("BTC", PositionSide::Long, 0.4, 2.0).unwrap();
        assert!((wallet.holdings()["BTC"] - 0.6).abs() < 1e-12);

        wallet.close("BTC", PositionSide::Long, 0.6, 2.0).unwrap();
        assert!(!wallet.holdings().contains_key("BTC"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn open_close_roundtrip_restores_cash_ignoring_fees() {
        // At an unchanged price the only cash delta over open -> close ->
        // realized-pnl(0) is the two fees.
        let path = temp_path("roundtrip");
        let mut wallet = PaperWallet::new(&path, 1_000_000.0);
        wallet.open("BTC", PositionSide::Long, 0.5, 250.0).unwrap();
        wallet.close("BTC", PositionSide::Long, 0.5, 250.0).unwrap();
        wallet.add_realized_pnl(0.0);

        assert!((wallet.cash() - (1_000_000.0 - 500.0)).abs() < 1e-9);
        assert!(wallet.holdings().is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn snapshot_roundtrip_across_restart() {
        let path = temp_path("restart");
        {
            let mut wallet = PaperWallet::new(&path, 500_000.0);
            wallet.open("BTC", PositionSide::Long, 0.25, 100.0).unwrap();
            wallet.add_realized_pnl(1_234.5);
        }
        let wallet = PaperWallet::new(&path, 999.0); // starting cash ignored
        assert!((wallet.cash() - (500_000.0 - 100.0 + 1_234.5)).abs() < 1e-9);
        assert!((wallet.holdings()["BTC"] - 0.25).abs() < 1e-12);

        let _ = std::fs::remove_file(&path);
    }
}
