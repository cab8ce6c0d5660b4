#![no_std]

mod constants;
mod contract;
mod errors;
mod events;
mod interest;
mod math;
mod storage;
mod withdrawals;

pub use constants::*;
pub use contract::*;
pub use errors::*;
pub use events::*;
pub use storage::*;
