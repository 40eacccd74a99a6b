//! Business logic services for SupplyMate

pub mod barcode;
pub mod catalog;
pub mod input;
pub mod ledger;
pub mod order;
pub mod partner;
pub mod reporting;
pub mod retry;
pub mod user;

pub use barcode::BarcodeResolver;
pub use catalog::ProductService;
pub use input::InputService;
pub use ledger::LedgerService;
pub use order::OrderService;
pub use partner::PartnerService;
pub use reporting::ReportingService;
pub use retry::with_busy_retry;
pub use user::UserService;
