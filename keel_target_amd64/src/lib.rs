//! keel_target_amd64: AMD64 platform description.

pub mod abi;
pub mod reg;


pub use abi::{managed_abi, native_abi, platform};
