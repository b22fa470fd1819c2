//! Lexical token kinds, operator precedences, and keyword spellings.

use derive_more::Display;

/// Token kinds.  The `+`/`-` spellings lex as the binary operators; the
/// parser reinterprets them as `Pos`/`Neg` in prefix position.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Unary operators.
    #[display("+")]
    Pos,
    #[display("-")]
    Neg,
    #[display("~")]
    BitNot,
    #[display("!")]
    Not,
    // Binary operators.
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Rem,
    #[display("<<")]
    Shl,
    #[display(">>")]
    Shr,
    #[display("&")]
    BitAnd,
    #[display("|")]
    BitOr,
    #[display("^")]
    BitXor,
    #[display("=")]
    Eql,
    #[display("==")]
    Eq,
    #[display("!=")]
    Ne,
    #[display("<")]
    Lt,
    #[display("<=")]
    Le,
    #[display(">")]
    Gt,
    #[display(">=")]
    Ge,
    #[display("&&")]
    And,
    #[display("||")]
    Or,
    #[display("[...]")]
    Subscript,
    #[display(".")]
    Period,
    #[display("+=")]
    AddEql,
    #[display("-=")]
    SubEql,
    #[display("*=")]
    MulEql,
    #[display("/=")]
    DivEql,
    #[display("%=")]
    RemEql,
    #[display("<<=")]
    ShlEql,
    #[display(">>=")]
    ShrEql,
    #[display("&=")]
    BitAndEql,
    #[display("|=")]
    BitOrEql,
    #[display("^=")]
    BitXorEql,
    #[display(":")]
    Colon,
    #[display("(...)")]
    Call,
    // Special operators.
    #[display("@")]
    At,
    #[display("?")]
    Question,
    #[display("$")]
    Dollar,
    #[display("..")]
    DotDot,
    #[display("...")]
    Ellipsis,
    #[display("<-")]
    LArrow,
    #[display("->")]
    RArrow,
    #[display(",")]
    Comma,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("[")]
    LBracket,
    #[display("]")]
    RBracket,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    // Keywords.
    #[display("nil")]
    KwNil,
    #[display("true")]
    KwTrue,
    #[display("false")]
    KwFalse,
    #[display("func")]
    KwFunc,
    #[display("struct")]
    KwStruct,
    #[display("if")]
    KwIf,
    #[display("elif")]
    KwElif,
    #[display("else")]
    KwElse,
    #[display("while")]
    KwWhile,
    #[display("for")]
    KwFor,
    #[display("break")]
    KwBreak,
    #[display("continue")]
    KwContinue,
    #[display("return")]
    KwReturn,
    #[display("throw")]
    KwThrow,
    #[display("end")]
    KwEnd,
    // Literals.
    #[display("integer")]
    LitInt,
    #[display("floating-point")]
    LitFloat,
    #[display("string")]
    LitString,
    #[display("symbol")]
    LitSymbol,
    #[display("identifier")]
    Identifier,
    /// End of statement: a newline or `;`.
    #[display("end-of-statement")]
    Eos,
    #[display("end-of-source")]
    Eof,
}

impl TokenKind {
    pub fn is_unary_op(self) -> bool {
        matches!(self, TokenKind::Pos | TokenKind::Neg | TokenKind::BitNot | TokenKind::Not)
    }

    pub fn is_binary_op(self) -> bool {
        (TokenKind::Add as u8..=TokenKind::Call as u8).contains(&(self as u8))
    }

    pub fn is_operator(self) -> bool {
        self.is_unary_op() || self.is_binary_op()
    }

    pub fn is_keyword(self) -> bool {
        (TokenKind::KwNil as u8..=TokenKind::KwEnd as u8).contains(&(self as u8))
    }

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::LitInt | TokenKind::LitFloat | TokenKind::LitString | TokenKind::LitSymbol
        )
    }

    /// Operator precedence; lower binds tighter.  A negative value marks
    /// right-to-left associativity.
    pub fn precedence(self) -> i8 {
        use TokenKind::*;
        match self {
            Pos | Neg | BitNot | Not => -3,
            Add | Sub => 5,
            Mul | Div | Rem => 4,
            Shl | Shr => 6,
            BitAnd => 10,
            BitOr => 12,
            BitXor => 11,
            Eql => -15,
            Eq | Ne => 9,
            Lt | Le | Gt | Ge => 8,
            And => 13,
            Or => 14,
            Subscript | Call => 2,
            Period => 1,
            AddEql | SubEql | MulEql | DivEql | RemEql | ShlEql | ShrEql | BitAndEql | BitOrEql
            | BitXorEql => -15,
            Colon => 3,
            _ => panic!("precedence of a non-operator token"),
        }
    }
}

/// Look up a keyword by its spelling.
pub fn keyword(text: &[u8]) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match text {
        b"nil" => KwNil,
        b"true" => KwTrue,
        b"false" => KwFalse,
        b"func" => KwFunc,
        b"struct" => KwStruct,
        b"if" => KwIf,
        b"elif" => KwElif,
        b"else" => KwElse,
        b"while" => KwWhile,
        b"for" => KwFor,
        b"break" => KwBreak,
        b"continue" => KwContinue,
        b"return" => KwReturn,
        b"throw" => KwThrow,
        b"end" => KwEnd,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(TokenKind::Pos.is_unary_op());
        assert!(!TokenKind::Pos.is_binary_op());
        assert!(TokenKind::Add.is_binary_op());
        assert!(TokenKind::Call.is_binary_op());
        assert!(TokenKind::KwWhile.is_keyword());
        assert!(TokenKind::LitInt.is_literal());
        assert!(!TokenKind::Eof.is_operator());
    }

    #[test]
    fn precedences_follow_the_table() {
        assert_eq!(TokenKind::Mul.precedence(), 4);
        assert_eq!(TokenKind::Add.precedence(), 5);
        assert_eq!(TokenKind::Eql.precedence(), -15);
        assert!(TokenKind::Period.precedence() < TokenKind::Mul.precedence());
    }

    #[test]
    fn keywords_resolve() {
        assert_eq!(keyword(b"while"), Some(TokenKind::KwWhile));
        assert_eq!(keyword(b"elif"), Some(TokenKind::KwElif));
        assert_eq!(keyword(b"whileish"), None);
    }
}
