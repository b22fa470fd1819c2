//! The back-end of the compiler: the function assembler and the AST-to-
//! bytecode code generator.

pub mod asm;
pub mod codegen;

pub use asm::Assembler;
pub use codegen::{compile_source, Codegen};
