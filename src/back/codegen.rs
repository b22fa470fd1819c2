//! The AST-to-bytecode code generator, and the source-to-function driver.
//!
//! The generator owns the assembler and dispatches over the AST tag set.
//! The per-node lowering is not implemented yet: every handler reports a
//! `syntax` exception carrying the node's source location, through the
//! ordinary result channel.
//!
//! `compile_source` is the front door of the whole pipeline.  Until the
//! parser grows its grammar, it validates the token stream to end of input
//! and produces a trivial initializer function.

use log::debug;

use crate::back::asm::Assembler;
use crate::common::VmResult;
use crate::front::ast::Node;
use crate::front::lex::Lexer;
use crate::front::token::TokenKind;
use crate::runtime::context::Context;
use crate::value::exception;
use crate::value::function::{self, FuncMeta};
use crate::value::repr::Value;

pub struct Codegen {
    asm: Assembler,
}

impl Codegen {
    pub fn new() -> Codegen {
        Codegen { asm: Assembler::new() }
    }

    /// Generate a bytecode function from the AST.  On failure the exception
    /// is written to reg-0.
    pub fn generate(&mut self, z: &mut Context, ast: &Node, module: Value) -> VmResult<Value> {
        self.emit(z, ast, None)?;
        Ok(self.asm.finish(z, module))
    }

    /// Lower one node, placing its result in `target` when one is given.
    /// The dispatch covers the closed tag set; every handler is a stub for
    /// now and reports the node it cannot lower.
    fn emit(&mut self, z: &mut Context, node: &Node, target: Option<u32>) -> VmResult {
        use crate::front::ast::NodeKind::*;
        let _ = target;
        match &node.kind {
            Nil => Err(self.error_not_implemented(z, node)),
            Bool(_) => Err(self.error_not_implemented(z, node)),
            Constant(_) => Err(self.error_not_implemented(z, node)),
            Name(_) => Err(self.error_not_implemented(z, node)),
            Pos(_) => Err(self.error_not_implemented(z, node)),
            Neg(_) => Err(self.error_not_implemented(z, node)),
            BitNot(_) => Err(self.error_not_implemented(z, node)),
            Not(_) => Err(self.error_not_implemented(z, node)),
            Add(..) => Err(self.error_not_implemented(z, node)),
            Sub(..) => Err(self.error_not_implemented(z, node)),
            Mul(..) => Err(self.error_not_implemented(z, node)),
            Div(..) => Err(self.error_not_implemented(z, node)),
            Rem(..) => Err(self.error_not_implemented(z, node)),
            Shl(..) => Err(self.error_not_implemented(z, node)),
            Shr(..) => Err(self.error_not_implemented(z, node)),
            BitAnd(..) => Err(self.error_not_implemented(z, node)),
            BitOr(..) => Err(self.error_not_implemented(z, node)),
            BitXor(..) => Err(self.error_not_implemented(z, node)),
            Assign(..) => Err(self.error_not_implemented(z, node)),
            Eq(..) => Err(self.error_not_implemented(z, node)),
            Ne(..) => Err(self.error_not_implemented(z, node)),
            Lt(..) => Err(self.error_not_implemented(z, node)),
            Le(..) => Err(self.error_not_implemented(z, node)),
            Gt(..) => Err(self.error_not_implemented(z, node)),
            Ge(..) => Err(self.error_not_implemented(z, node)),
            Cmp(..) => Err(self.error_not_implemented(z, node)),
            And(..) => Err(self.error_not_implemented(z, node)),
            Or(..) => Err(self.error_not_implemented(z, node)),
            Subscript(..) => Err(self.error_not_implemented(z, node)),
            Field(..) => Err(self.error_not_implemented(z, node)),
            Call { .. } => Err(self.error_not_implemented(z, node)),
            Send { .. } => Err(self.error_not_implemented(z, node)),
            Tuple(_) => Err(self.error_not_implemented(z, node)),
            Array(_) => Err(self.error_not_implemented(z, node)),
            Map(_) => Err(self.error_not_implemented(z, node)),
            Import(_) => Err(self.error_not_implemented(z, node)),
            Return(_) => Err(self.error_not_implemented(z, node)),
            Throw(_) => Err(self.error_not_implemented(z, node)),
            Break => Err(self.error_not_implemented(z, node)),
            Continue => Err(self.error_not_implemented(z, node)),
            Cond { .. } => Err(self.error_not_implemented(z, node)),
            While { .. } => Err(self.error_not_implemented(z, node)),
            Func { .. } => Err(self.error_not_implemented(z, node)),
            Module(_) => Err(self.error_not_implemented(z, node)),
        }
    }

    fn error_not_implemented(&mut self, z: &mut Context, node: &Node) -> crate::common::Thrown {
        self.asm.clear();
        let loc = node.loc;
        let exc = exception::format(
            z,
            Some("syntax"),
            None,
            format!("{}:{}: not implemented: {}", loc.line0, loc.column0, node.kind.name()),
        );
        z.throw(exc)
    }
}

impl Default for Codegen {
    fn default() -> Codegen {
        Codegen::new()
    }
}

/// Compile source code from the `input` stream into a module initializer
/// function.  On failure the exception (kind `syntax`) is in reg-0.
pub fn compile_source(z: &mut Context, input: Value) -> VmResult<Value> {
    let mut lexer = Lexer::new();
    lexer.start(z, input);
    let mut tokens = 0usize;
    let result = loop {
        match lexer.next(z) {
            Ok(tok) if tok.kind == TokenKind::Eof => break Ok(()),
            Ok(_) => tokens += 1,
            Err(err) => break Err(err),
        }
    };
    lexer.finish(z);
    match result {
        Ok(()) => {
            debug!(target: "kura::codegen", "validated {tokens} tokens");
            // The initializer takes the module as its only argument.
            let meta = FuncMeta { na: 1, no: 0, nr: 2 };
            Ok(function::new_native(z, meta, init_stub))
        }
        Err(err) => {
            let exc = exception::format(z, Some("syntax"), None, err.to_string());
            Err(z.throw(exc))
        }
    }
}

fn init_stub(z: &mut Context) -> VmResult {
    let nil = z.nil();
    z.set_reg0(nil);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::ast::{NodeKind, SourceLoc};
    use crate::runtime::invoke;
    use crate::value::stream;
    use crate::value::symbol;

    #[test]
    fn compiles_well_formed_source_to_a_callable() {
        let mut z = Context::for_tests();
        let input = stream::new_bytes(&mut z, b"x = 1 + 2  # comment\n".to_vec());
        let func = compile_source(&mut z, input).unwrap();
        assert!(function::is_function(&z, func));
        let module = crate::value::module::new(&mut z);
        let ret = invoke::call(&mut z, func, &[module]).unwrap();
        assert_eq!(ret, z.nil());
    }

    #[test]
    fn reports_lexical_errors_as_syntax_exceptions() {
        let mut z = Context::for_tests();
        let input = stream::new_bytes(&mut z, b"ok = `broken`\n".to_vec());
        let result = compile_source(&mut z, input);
        assert!(result.is_err());
        let exc = z.reg0();
        let kind = exception::kind(&z, exc);
        assert_eq!(symbol::bytes(&z, kind), b"syntax");
        let what = exception::what(&z, exc);
        assert!(crate::value::string::to_utf8(&z, what).contains("1:6"));
    }

    #[test]
    fn lowering_is_not_implemented_yet() {
        let mut z = Context::for_tests();
        let mut cg = Codegen::new();
        let node = Node::new(NodeKind::Nil, SourceLoc { line0: 3, column0: 7, line1: 3, column1: 9 });
        let result = cg.generate(&mut z, &node, Value::ZERO);
        assert!(result.is_err());
        let exc = z.reg0();
        let what = exception::what(&z, exc);
        let text = crate::value::string::to_utf8(&z, what);
        assert!(text.contains("3:7"));
        assert!(text.contains("Nil"));
    }
}
