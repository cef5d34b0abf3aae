//! Shared data types for the Vela trading system.

pub mod decision;
pub mod market;
pub mod trading;

pub use decision::*;
pub use market::*;
pub use trading::*;
