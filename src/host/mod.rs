//! Capabilities of the spreadsheet host runtime: its network primitive and the spreadsheet itself.

pub mod fetch;
pub mod sheets;

pub use fetch::HostFetchClient;
pub use sheets::GoogleSheetsTable;
