pub mod orders;
pub mod reports;
pub mod stocks;

pub use reports::PostingsReportEndpoints;
