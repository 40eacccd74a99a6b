//! Domain models for the SupplyMate inventory platform

mod input;
mod ledger;
mod order;
mod partner;
mod product;
mod report;
mod user;

pub use input::*;
pub use ledger::*;
pub use order::*;
pub use partner::*;
pub use product::*;
pub use report::*;
pub use user::*;
