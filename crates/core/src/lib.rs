//! Core domain types for the order notifier.

pub mod address;
pub mod amount;
pub mod order;

pub use address::*;
pub use amount::*;
pub use order::*;
