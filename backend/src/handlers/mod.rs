//! HTTP handlers

pub mod dashboard;
pub mod health;
pub mod inputs;
pub mod orders;
pub mod partners;
pub mod products;
pub mod users;

pub use dashboard::*;
pub use health::*;
pub use inputs::*;
pub use orders::*;
pub use partners::*;
pub use products::*;
pub use users::*;
