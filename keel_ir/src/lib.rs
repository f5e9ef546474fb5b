//! keel_ir: Source intermediate representation for the keel method backend.
//!
//! A `Method` is produced and verified by the front end and is frozen by the
//! time lowering sees it. Everything is arena-indexed: variables, blocks and
//! method actors are referenced by `u32` handles.

pub mod actor;
pub mod builder;
pub mod instruction;
pub mod method;
pub mod types;
pub mod value;
