pub mod auth;
pub mod client;
pub mod pacer;

pub use client::{ClosedOrder, ExchangeClient, OrderRequest, PlacedOrder};
