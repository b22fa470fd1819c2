//! The kura runtime as a library: a stack-based bytecode virtual machine
//! with a moving generational garbage collector, a streaming UTF-8 lexer, a
//! compiler front-end, and a module/function object system.  See the
//! `src/bin` directory for the executable programs using this library.

pub mod common;
pub mod strutil;
pub mod instr;
pub mod mem;
pub mod value;
pub mod runtime;
pub mod front;
pub mod back;
