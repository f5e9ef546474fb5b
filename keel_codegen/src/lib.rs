//! keel_codegen: Lowering of source methods to target IR.
//!
//! A [`Compiler`] lowers one method at a time through a
//! [`MethodTranslationContext`], then hands the result to a
//! [`RegisterAllocator`](regalloc::RegisterAllocator) and a
//! [`BlockLayout`](layout::BlockLayout).

pub mod compile;
pub mod context;
pub mod error;
pub mod layout;
pub mod mapping;
pub mod observer;
pub mod regalloc;
mod translate;


pub use compile::{Compiler, LoweringOptions};
pub use context::MethodTranslationContext;
pub use error::LoweringError;
