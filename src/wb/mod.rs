//! Wildberries seller analytics.

pub mod funnel;
pub mod reports;
pub mod stocks;

pub use reports::StockHistoryEndpoints;
