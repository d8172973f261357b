pub mod executor;
pub mod paper;

pub use executor::{BalancesSnapshot, Fill, OrderExecutor};
pub use paper::PaperWallet;
