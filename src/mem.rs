//! Object memory: heap spaces, the moving collector, and locals roots.

pub mod heap;
pub mod locals;

pub use heap::{AllocMode, MemConfig, ObjMem};
pub use locals::{LocalsBlock, LocalsStack};
