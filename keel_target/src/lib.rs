//! keel_target: Target IR for the keel backend.
//!
//! The target IR is produced by lowering a source method against one
//! platform's calling conventions. Every value carries its kind, every variable
//! eventually carries a [`Location`](location::Location), and every call,
//! throw and infopoint carries what the garbage collector and the unwinder
//! need to walk the frame.

pub mod abi;
pub mod block;
pub mod display;
pub mod frame;
pub mod inst;
pub mod location;
pub mod method;
pub mod value;


pub use keel_regalloc::PReg;
