//! The parser: consumes tokens and builds the AST.
//!
//! Only the interface and the token plumbing are implemented; the grammar
//! productions report "not implemented" through the ordinary exception
//! channel, never by aborting.

use crate::common::VmResult;
use crate::front::lex::{LexError, Lexer, Token};
use crate::front::token::TokenKind;
use crate::runtime::context::Context;
use crate::value::exception;
use crate::value::repr::Value;

use super::ast::Node;

/// What a parse request produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseWhat {
    /// A whole module, as one function body.
    Module,
    /// The next expression.
    Expr,
}

pub struct Parser {
    lexer: Lexer,
    peeked: Option<Token>,
}

impl Parser {
    pub fn new() -> Parser {
        Parser { lexer: Lexer::new(), peeked: None }
    }

    /// Parse the `input` stream and build an AST.  On failure the exception
    /// is written to reg-0.
    pub fn parse(&mut self, z: &mut Context, input: Value, what: ParseWhat) -> VmResult<Node> {
        self.lexer.start(z, input);
        self.peeked = None;
        let result = self.parse_entry(z, what);
        self.lexer.finish(z);
        result
    }

    fn parse_entry(&mut self, z: &mut Context, what: ParseWhat) -> VmResult<Node> {
        let first = self.peek_token(z)?;
        let _ = first;
        let target = match what {
            ParseWhat::Module => "module",
            ParseWhat::Expr => "expression",
        };
        Err(self.error_not_implemented(z, target))
    }

    /// The next token without consuming it.
    fn peek_token(&mut self, z: &mut Context) -> VmResult<Token> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lex_next(z)?);
        }
        Ok(self.peeked.unwrap())
    }

    /// Consume and return the next token.
    fn next_token(&mut self, z: &mut Context) -> VmResult<Token> {
        match self.peeked.take() {
            Some(tok) => Ok(tok),
            None => self.lex_next(z),
        }
    }

    /// Consume a token that must be of `kind`.
    #[allow(dead_code)]
    fn expect_token(&mut self, z: &mut Context, kind: TokenKind) -> VmResult<Token> {
        let tok = self.next_token(z)?;
        if tok.kind != kind {
            let exc = exception::format(
                z,
                Some("syntax"),
                None,
                format!("{}:{}: expected {kind}, found {}", tok.line0, tok.column0, tok.kind),
            );
            return Err(z.throw(exc));
        }
        Ok(tok)
    }

    fn lex_next(&mut self, z: &mut Context) -> VmResult<Token> {
        self.lexer.next(z).map_err(|err| self.throw_lex_error(z, err))
    }

    fn throw_lex_error(&self, z: &mut Context, err: LexError) -> crate::common::Thrown {
        let exc = exception::format(z, Some("syntax"), None, err.to_string());
        z.throw(exc)
    }

    fn error_not_implemented(&self, z: &mut Context, what: &str) -> crate::common::Thrown {
        let exc = exception::format(z, Some("syntax"), None, format!("not implemented: parsing a {what}"));
        z.throw(exc)
    }
}

impl Default for Parser {
    fn default() -> Parser {
        Parser::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::stream;
    use crate::value::symbol;

    #[test]
    fn parse_reports_not_implemented() {
        let mut z = Context::for_tests();
        let input = stream::new_bytes(&mut z, b"1 + 2\n".to_vec());
        let mut parser = Parser::new();
        let result = parser.parse(&mut z, input, ParseWhat::Module);
        assert!(result.is_err());
        let exc = z.reg0();
        let kind = exception::kind(&z, exc);
        assert_eq!(symbol::bytes(&z, kind), b"syntax");
    }

    #[test]
    fn lex_errors_become_syntax_exceptions() {
        let mut z = Context::for_tests();
        let input = stream::new_bytes(&mut z, b"`".to_vec());
        let mut parser = Parser::new();
        let result = parser.parse(&mut z, input, ParseWhat::Expr);
        assert!(result.is_err());
        let exc = z.reg0();
        let kind = exception::kind(&z, exc);
        assert_eq!(symbol::bytes(&z, kind), b"syntax");
    }
}
