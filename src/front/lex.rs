//! The lexer: streaming UTF-8 tokenization with precise source positions.
//!
//! Input comes from a `Stream` object through 1-byte peek/read operations
//! and a bulk buffer view.  Literal and identifier tokens carry a heap value
//! (int/float/string/symbol); the in-progress literal accumulator and the
//! input stream live in a locals block the collector treats as a root while
//! the lexer is active.
//!
//! `next` returns a token or a positioned error; no non-local control
//! transfer is involved.

use log::trace;

use crate::front::token::{self, TokenKind};
use crate::mem::LocalsBlock;
use crate::runtime::context::Context;
use crate::strutil;
use crate::value::float;
use crate::value::int;
use crate::value::repr::Value;
use crate::value::stream::{self, CharRead};
use crate::value::string;
use crate::value::symbol;

/// A lexical token: start/end position (1-based line and column, both
/// inclusive), kind, and the literal/identifier value when there is one.
#[derive(Clone, Copy, Debug)]
pub struct Token {
    pub line0: u32,
    pub column0: u32,
    pub line1: u32,
    pub column1: u32,
    pub kind: TokenKind,
    pub value: Value,
}

/// A positioned lexer error.
pub struct LexError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: syntax error: {}", self.line, self.column, self.message)
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

const SLOT_INPUT: usize = 0;
const SLOT_TEMP: usize = 1;

pub struct Lexer {
    line: u32,
    column: u32,
    last_line: u32,
    last_column: u32,
    ignore_eol: u32,
    prev_kind: Option<TokenKind>,
    eof_eos_sent: bool,
    locals: Option<LocalsBlock>,
}

impl Lexer {
    pub fn new() -> Lexer {
        Lexer {
            line: 1,
            column: 1,
            last_line: 1,
            last_column: 1,
            ignore_eol: 0,
            prev_kind: None,
            eof_eos_sent: false,
            locals: None,
        }
    }

    /// Start lexing an input stream.  Reserves the locals block that roots
    /// the stream and the literal accumulator; `finish` releases it.
    pub fn start(&mut self, z: &mut Context, input: Value) {
        debug_assert!(self.locals.is_none(), "lexer already started");
        debug_assert!(stream::is_stream(z, input));
        let block = z.locals_enter(2);
        block.set(&mut z.locals, SLOT_INPUT, input);
        self.locals = Some(block);
        self.line = 1;
        self.column = 1;
        self.last_line = 1;
        self.last_column = 1;
        self.ignore_eol = 0;
        self.prev_kind = None;
        self.eof_eos_sent = false;
    }

    /// Finish the current input and release the locals block.
    pub fn finish(&mut self, z: &mut Context) {
        if let Some(block) = self.locals.take() {
            z.locals_leave(block);
        }
    }

    /// Start of a region where end-of-line is not a statement end.
    pub fn ignore_eol_begin(&mut self) {
        self.ignore_eol += 1;
    }

    pub fn ignore_eol_end(&mut self) {
        debug_assert!(self.ignore_eol > 0);
        self.ignore_eol -= 1;
    }

    fn block(&self) -> LocalsBlock {
        self.locals.expect("lexer is not started")
    }

    fn input(&self, z: &Context) -> Value {
        self.block().get(&z.locals, SLOT_INPUT)
    }

    fn temp(&self, z: &Context) -> Value {
        self.block().get(&z.locals, SLOT_TEMP)
    }

    fn set_temp(&self, z: &mut Context, v: Value) {
        self.block().set(&mut z.locals, SLOT_TEMP, v);
    }

    /* ----- input and positions --------------------------------------------- */

    fn peek(&self, z: &mut Context) -> CharRead {
        let input = self.input(z);
        stream::peek_char(z, input)
    }

    /// Consume one character, updating the position bookkeeping.
    fn bump(&mut self, z: &mut Context) -> CharRead {
        let input = self.input(z);
        let c = stream::read_char(z, input);
        if let CharRead::Char(ch) = c {
            self.last_line = self.line;
            self.last_column = self.column;
            if ch == '\n' as u32 {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    /// The byte after the next character, for two-byte decisions.
    fn second_byte(&self, z: &mut Context) -> Option<u8> {
        let input = self.input(z);
        stream::with_buffer(z, input, 2, |buf, _| buf.get(1).copied())
    }

    fn pos(&self) -> (u32, u32) {
        (self.line, self.column)
    }

    fn tok(&self, kind: TokenKind, start: (u32, u32), value: Value) -> Token {
        Token {
            line0: start.0,
            column0: start.1,
            line1: self.last_line,
            column1: self.last_column,
            kind,
            value,
        }
    }

    fn error(&self, message: String) -> LexError {
        LexError { line: self.line, column: self.column, message }
    }

    fn error_unexpected_char(&self, c: u32) -> LexError {
        let display = match char::from_u32(c) {
            Some('"') => "'\"'".to_string(),
            Some(ch) if !ch.is_control() => format!("\"{ch}\""),
            _ => format!("U+{c:04X}"),
        };
        self.error(format!("unexpected character: {display}"))
    }

    fn error_unexpected_end_of(&self, what: &str) -> LexError {
        self.error(format!("unexpected end of {what}"))
    }

    /* ----- operator helpers -------------------------------------------------- */

    fn op1(&mut self, z: &mut Context, kind: TokenKind) -> Token {
        let start = self.pos();
        self.bump(z);
        self.tok(kind, start, Value::ZERO)
    }

    /// `C` or `C=`.
    fn op2(&mut self, z: &mut Context, kind: TokenKind, kind_eql: TokenKind) -> Token {
        let start = self.pos();
        self.bump(z);
        if self.peek(z) == CharRead::Char('=' as u32) {
            self.bump(z);
            self.tok(kind_eql, start, Value::ZERO)
        } else {
            self.tok(kind, start, Value::ZERO)
        }
    }

    /// `C`, `C=`, or `CC`.
    fn op3(
        &mut self,
        z: &mut Context,
        c: u32,
        kind: TokenKind,
        kind_eql: TokenKind,
        kind_cc: TokenKind,
    ) -> Token {
        self.op4x(z, c, kind, kind_eql, kind_cc, None)
    }

    /// `C`, `C=`, or `CX`.
    fn op3x(
        &mut self,
        z: &mut Context,
        kind: TokenKind,
        kind_eql: TokenKind,
        x: u32,
        kind_cx: TokenKind,
    ) -> Token {
        let start = self.pos();
        self.bump(z);
        match self.peek(z) {
            CharRead::Char(second) if second == x => {
                self.bump(z);
                self.tok(kind_cx, start, Value::ZERO)
            }
            CharRead::Char(second) if second == '=' as u32 => {
                self.bump(z);
                self.tok(kind_eql, start, Value::ZERO)
            }
            _ => self.tok(kind, start, Value::ZERO),
        }
    }

    /// `C`, `C=`, `CC`, or `CX`.
    fn op4x(
        &mut self,
        z: &mut Context,
        c: u32,
        kind: TokenKind,
        kind_eql: TokenKind,
        kind_cc: TokenKind,
        x: Option<(u32, TokenKind)>,
    ) -> Token {
        let start = self.pos();
        self.bump(z);
        match self.peek(z) {
            CharRead::Char(second) if x.is_some_and(|(ch, _)| ch == second) => {
                self.bump(z);
                self.tok(x.unwrap().1, start, Value::ZERO)
            }
            CharRead::Char(second) if second == c => {
                self.bump(z);
                self.tok(kind_cc, start, Value::ZERO)
            }
            CharRead::Char(second) if second == '=' as u32 => {
                self.bump(z);
                self.tok(kind_eql, start, Value::ZERO)
            }
            _ => self.tok(kind, start, Value::ZERO),
        }
    }

    /* ----- scanning ----------------------------------------------------------- */

    /// Scan for the next token.
    pub fn next(&mut self, z: &mut Context) -> Result<Token, LexError> {
        let result = self.scan_next(z);
        debug_assert_eq!(self.temp(z), Value::ZERO, "literal accumulator left dirty");
        if let Ok(tok) = &result {
            self.prev_kind = Some(tok.kind);
            trace!(
                target: "kura::lexer",
                "token: pos=({},{}-{},{}), kind={}",
                tok.line0, tok.column0, tok.line1, tok.column1, tok.kind
            );
        }
        result
    }

    fn scan_next(&mut self, z: &mut Context) -> Result<Token, LexError> {
        use TokenKind::*;
        loop {
            let start = self.pos();
            let first = match self.peek(z) {
                CharRead::Eof => {
                    // A statement end is implied before the end of source.
                    if !self.eof_eos_sent && self.prev_kind.is_some_and(|k| k != Eos) {
                        self.eof_eos_sent = true;
                        self.last_line = self.line;
                        self.last_column = self.column;
                        return Ok(self.tok(Eos, start, Value::ZERO));
                    }
                    self.last_line = self.line;
                    self.last_column = self.column;
                    return Ok(self.tok(Eof, start, Value::ZERO));
                }
                CharRead::Invalid => return Err(self.error("illegal UTF-8 input".to_string())),
                CharRead::Char(c) => c,
            };
            let tok = match first {
                c if c == '\t' as u32 || c == ' ' as u32 => {
                    self.bump(z);
                    continue;
                }
                c if c == '\n' as u32 => {
                    if self.ignore_eol > 0 {
                        self.bump(z);
                        continue;
                    }
                    self.op1(z, Eos)
                }
                c if c == ';' as u32 => self.op1(z, Eos),
                c if c == '#' as u32 => {
                    // Comments run to end of line and swallow the newline.
                    // The body is skipped in bulk from the buffer view.
                    self.bump(z);
                    loop {
                        let input = self.input(z);
                        let (skip, chars, newline) = stream::with_buffer(z, input, 1, |buf, _| {
                            match memchr::memchr(b'\n', buf) {
                                Some(i) => (i + 1, strutil::u8str_count_chars(&buf[..i]), true),
                                None => (buf.len(), strutil::u8str_count_chars(buf), false),
                            }
                        });
                        if skip == 0 {
                            break; // end of input
                        }
                        stream::consume(z, input, skip);
                        if newline {
                            self.last_line = self.line;
                            self.last_column = self.column + chars as u32;
                            self.line += 1;
                            self.column = 1;
                            break;
                        }
                        self.column += chars as u32;
                    }
                    continue;
                }
                c if c == '\\' as u32 => {
                    // Line continuation: backslash immediately before newline.
                    self.bump(z);
                    match self.peek(z) {
                        CharRead::Char(ch) if ch == '\n' as u32 => {
                            self.bump(z);
                            continue;
                        }
                        CharRead::Char(ch) => return Err(self.error_unexpected_char(ch)),
                        _ => return Err(self.error_unexpected_end_of("line continuation")),
                    }
                }
                c if c == '!' as u32 => self.op2(z, Not, Ne),
                c if c == '$' as u32 => self.op1(z, Dollar),
                c if c == '%' as u32 => self.op2(z, Rem, RemEql),
                c if c == '&' as u32 => self.op3(z, c, BitAnd, BitAndEql, And),
                c if c == '*' as u32 => self.op2(z, Mul, MulEql),
                c if c == '+' as u32 => self.op2(z, Add, AddEql),
                c if c == ',' as u32 => self.op1(z, Comma),
                c if c == '-' as u32 => self.op3x(z, Sub, SubEql, '>' as u32, RArrow),
                c if c == '.' as u32 => {
                    self.bump(z);
                    if self.peek(z) == CharRead::Char('.' as u32) {
                        self.bump(z);
                        if self.peek(z) == CharRead::Char('.' as u32) {
                            self.bump(z);
                            self.tok(Ellipsis, start, Value::ZERO)
                        } else {
                            self.tok(DotDot, start, Value::ZERO)
                        }
                    } else {
                        self.tok(Period, start, Value::ZERO)
                    }
                }
                c if c == '/' as u32 => self.op2(z, Div, DivEql),
                c if c == ':' as u32 => self.op1(z, Colon),
                c if c == '<' as u32 => self.op4x(z, c, Lt, Le, Shl, Some(('-' as u32, LArrow))),
                c if c == '=' as u32 => self.op2(z, Eql, Eq),
                c if c == '>' as u32 => self.op3(z, c, Gt, Ge, Shr),
                c if c == '?' as u32 => self.op1(z, Question),
                c if c == '@' as u32 => {
                    self.bump(z);
                    match self.peek(z) {
                        CharRead::Char(q) if q == '"' as u32 || q == '\'' as u32 => {
                            self.scan_string(z, start, q, false)?
                        }
                        _ => self.tok(At, start, Value::ZERO),
                    }
                }
                c if c == '^' as u32 => self.op2(z, BitXor, BitXorEql),
                c if c == '|' as u32 => self.op3(z, c, BitOr, BitOrEql, Or),
                c if c == '~' as u32 => self.op1(z, BitNot),
                c if c == '"' as u32 || c == '\'' as u32 => self.scan_string(z, start, c, true)?,
                c if c < 0x80 && (c as u8).is_ascii_digit() => self.scan_number(z, start)?,
                c if c == '(' as u32 => self.op1(z, LParen),
                c if c == ')' as u32 => self.op1(z, RParen),
                c if c == '[' as u32 => self.op1(z, LBracket),
                c if c == ']' as u32 => self.op1(z, RBracket),
                c if c == '{' as u32 => self.op1(z, LBrace),
                c if c == '}' as u32 => self.op1(z, RBrace),
                c if is_ident_start(c) => self.scan_identifier(z, start)?,
                c => return Err(self.error_unexpected_char(c)),
            };
            return Ok(tok);
        }
    }

    fn scan_number(&mut self, z: &mut Context, start: (u32, u32)) -> Result<Token, LexError> {
        let mut base = 10u32;
        let mut digits = 0usize;
        self.set_temp(z, Value::ZERO);

        if self.peek(z) == CharRead::Char('0' as u32) {
            self.bump(z);
            digits = 1;
            match self.peek(z) {
                CharRead::Char(c) if c == 'b' as u32 || c == 'B' as u32 => {
                    base = 2;
                    digits = 0;
                    self.bump(z);
                }
                CharRead::Char(c) if c == 'o' as u32 || c == 'O' as u32 => {
                    base = 8;
                    digits = 0;
                    self.bump(z);
                }
                CharRead::Char(c) if c == 'x' as u32 || c == 'X' as u32 => {
                    base = 16;
                    digits = 0;
                    self.bump(z);
                }
                CharRead::Char(c) if c < 0x80 && (c as u8).is_ascii_alphabetic() => {
                    return Err(self.error_unexpected_char(c));
                }
                _ => {}
            }
        }

        loop {
            match self.peek(z) {
                CharRead::Char(c) if strutil::char_digit(c) < base => {
                    let d = strutil::char_digit(c);
                    self.bump(z);
                    let acc = self.temp(z);
                    let acc = int::mul_add_small(z, acc, base as u64, d as u64);
                    self.set_temp(z, acc);
                    digits += 1;
                }
                _ => break,
            }
        }
        if digits == 0 {
            self.set_temp(z, Value::ZERO);
            return Err(self.error_unexpected_end_of("number literal"));
        }

        // A `.` followed by a digit begins the fractional part; any other
        // `.` (field access, ranges) belongs to the next token.
        let fractional = self.peek(z) == CharRead::Char('.' as u32)
            && self
                .second_byte(z)
                .is_some_and(|b| strutil::char_digit(b as u32) < base);
        if !fractional {
            let value = self.temp(z);
            self.set_temp(z, Value::ZERO);
            trace!(target: "kura::lexer", "int: base={base}");
            return Ok(self.tok(TokenKind::LitInt, start, value));
        }

        let acc = self.temp(z);
        let mut value = int::value_f64(z, acc).expect("number accumulator is not an integer");
        self.set_temp(z, Value::ZERO);
        if value.is_infinite() {
            return Err(self.error("number literal is too large".to_string()));
        }
        self.bump(z); // the `.`
        let mut weight = 1.0 / base as f64;
        loop {
            match self.peek(z) {
                CharRead::Char(c) if strutil::char_digit(c) < base => {
                    let d = strutil::char_digit(c);
                    self.bump(z);
                    value += d as f64 * weight;
                    weight /= base as f64;
                }
                _ => break,
            }
        }
        if value.is_infinite() {
            return Err(self.error("number literal is too large".to_string()));
        }
        trace!(target: "kura::lexer", "float: base={base}, value={value}");
        let value = float::new(z, value);
        Ok(self.tok(TokenKind::LitFloat, start, value))
    }

    fn scan_escape(&mut self, z: &mut Context) -> Result<u32, LexError> {
        let c = match self.bump(z) {
            CharRead::Char(c) => c,
            _ => return Err(self.error_unexpected_end_of("escape sequence")),
        };
        let code = match c {
            c if c == '\'' as u32 => '\'' as u32,
            c if c == '"' as u32 => '"' as u32,
            c if c == '\\' as u32 => '\\' as u32,
            c if c == 'a' as u32 => 0x07,
            c if c == 'b' as u32 => 0x08,
            c if c == 'f' as u32 => 0x0c,
            c if c == 'n' as u32 => '\n' as u32,
            c if c == 'r' as u32 => '\r' as u32,
            c if c == 't' as u32 => '\t' as u32,
            c if c == 'v' as u32 => 0x0b,
            c if c == 'x' as u32 => {
                let mut value = 0u32;
                for _ in 0..2 {
                    match self.bump(z) {
                        CharRead::Char(h) if strutil::char_digit(h) < 16 => {
                            value = value * 16 + strutil::char_digit(h);
                        }
                        _ => return Err(self.error("illegal escape sequence".to_string())),
                    }
                }
                if value >= 0x80 {
                    return Err(self.error("illegal escape sequence".to_string()));
                }
                value
            }
            c if c == 'u' as u32 => {
                if self.bump(z) != CharRead::Char('{' as u32) {
                    return Err(self.error("illegal escape sequence".to_string()));
                }
                let mut value = 0u32;
                let mut count = 0usize;
                loop {
                    match self.bump(z) {
                        CharRead::Char(h) if h == '}' as u32 => break,
                        CharRead::Char(h) if strutil::char_digit(h) < 16 => {
                            value = value * 16 + strutil::char_digit(h);
                            count += 1;
                            if value > strutil::CODE_POINT_MAX {
                                return Err(self.error("illegal escape sequence".to_string()));
                            }
                        }
                        _ => return Err(self.error("illegal escape sequence".to_string())),
                    }
                }
                if count == 0 {
                    return Err(self.error("illegal escape sequence".to_string()));
                }
                value
            }
            _ => return Err(self.error("illegal escape sequence".to_string())),
        };
        Ok(code)
    }

    fn scan_string(
        &mut self,
        z: &mut Context,
        start: (u32, u32),
        delimiter: u32,
        allow_escapes: bool,
    ) -> Result<Token, LexError> {
        debug_assert_eq!(self.peek(z), CharRead::Char(delimiter));
        self.bump(z);
        let mut codes: Vec<u32> = Vec::new();
        loop {
            match self.bump(z) {
                CharRead::Eof => {
                    return Err(self.error_unexpected_end_of(
                        "input stream before the string literal terminates",
                    ));
                }
                CharRead::Invalid => return Err(self.error("illegal string literal".to_string())),
                CharRead::Char(c) if c == delimiter => break,
                CharRead::Char(c) if c == '\\' as u32 && allow_escapes => {
                    codes.push(self.scan_escape(z)?);
                }
                CharRead::Char(c) => codes.push(c),
            }
        }
        let value = string::from_code_points(z, &codes);
        trace!(target: "kura::lexer", "string: {} chars", codes.len());
        Ok(self.tok(TokenKind::LitString, start, value))
    }

    fn scan_identifier(&mut self, z: &mut Context, start: (u32, u32)) -> Result<Token, LexError> {
        let mut bytes: Vec<u8> = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            match self.peek(z) {
                CharRead::Char(c) if is_ident_continue(c) => {
                    self.bump(z);
                    let n = strutil::u8char_from_code(c, &mut buf);
                    bytes.extend_from_slice(&buf[..n]);
                }
                CharRead::Invalid => return Err(self.error_unexpected_end_of("identifier")),
                _ => break,
            }
        }
        debug_assert!(!bytes.is_empty());
        if let Some(kind) = token::keyword(&bytes) {
            return Ok(self.tok(kind, start, Value::ZERO));
        }
        let value = symbol::get(z, &bytes);
        trace!(target: "kura::lexer", "identifier: {}", String::from_utf8_lossy(&bytes));
        Ok(self.tok(TokenKind::Identifier, start, value))
    }
}

impl Default for Lexer {
    fn default() -> Lexer {
        Lexer::new()
    }
}

fn is_ident_start(c: u32) -> bool {
    c >= 0x80 || (c < 0x80 && ((c as u8).is_ascii_alphabetic() || c == '_' as u32))
}

fn is_ident_continue(c: u32) -> bool {
    c >= 0x80 || (c < 0x80 && ((c as u8).is_ascii_alphanumeric() || c == '_' as u32))
}

/// Render a token for the front-end inspector.
pub fn display_token(z: &Context, tok: &Token) -> String {
    let pos = format!("{}:{}-{}:{}", tok.line0, tok.column0, tok.line1, tok.column1);
    match tok.kind {
        TokenKind::LitInt => format!("{pos}\tinteger\t{}", int::to_decimal(z, tok.value)),
        TokenKind::LitFloat => {
            format!("{pos}\tfloating-point\t{}", float::value(z, tok.value).unwrap_or(f64::NAN))
        }
        TokenKind::LitString => format!("{pos}\tstring\t{:?}", string::to_utf8(z, tok.value)),
        TokenKind::Identifier => {
            format!("{pos}\tidentifier\t{}", String::from_utf8_lossy(symbol::bytes(z, tok.value)))
        }
        kind => format!("{pos}\t{kind}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::stream;

    fn lex_all(z: &mut Context, source: &str) -> Result<Vec<Token>, LexError> {
        let input = stream::new_bytes_chunked(z, source.as_bytes().to_vec(), 3);
        let mut lexer = Lexer::new();
        lexer.start(z, input);
        let mut tokens = Vec::new();
        let result = loop {
            match lexer.next(z) {
                Ok(tok) if tok.kind == TokenKind::Eof => break Ok(tokens),
                Ok(tok) => tokens.push(tok),
                Err(err) => break Err(err),
            }
        };
        lexer.finish(z);
        result
    }

    #[test]
    fn integer_bases() {
        let mut z = Context::for_tests();
        for (source, expect) in [("0x10", 16i64), ("0b1010", 10), ("0o17", 15), ("123", 123), ("0", 0)] {
            let toks = lex_all(&mut z, source).unwrap();
            assert_eq!(toks[0].kind, TokenKind::LitInt, "{source}");
            assert_eq!(toks[0].value.as_smallint(), Some(expect), "{source}");
        }
    }

    #[test]
    fn float_literals() {
        let mut z = Context::for_tests();
        let toks = lex_all(&mut z, "1.5").unwrap();
        assert_eq!(toks[0].kind, TokenKind::LitFloat);
        assert_eq!(float::value(&z, toks[0].value), Some(1.5));
        let toks = lex_all(&mut z, "0.25").unwrap();
        assert_eq!(float::value(&z, toks[0].value), Some(0.25));
    }

    #[test]
    fn big_integer_literals() {
        let mut z = Context::for_tests();
        let toks = lex_all(&mut z, "123456789012345678901234567890").unwrap();
        assert_eq!(toks[0].kind, TokenKind::LitInt);
        assert!(toks[0].value.is_object());
        assert_eq!(int::to_decimal(&z, toks[0].value), "123456789012345678901234567890");
    }

    #[test]
    fn string_escapes() {
        let mut z = Context::for_tests();
        let toks = lex_all(&mut z, r#""a\nb""#).unwrap();
        assert_eq!(toks[0].kind, TokenKind::LitString);
        assert_eq!(string::to_utf8(&z, toks[0].value), "a\nb");
        let toks = lex_all(&mut z, r#""\x41\u{1F600}""#).unwrap();
        assert_eq!(string::to_utf8(&z, toks[0].value), "A\u{1F600}");
    }

    #[test]
    fn raw_strings_keep_backslashes() {
        let mut z = Context::for_tests();
        let toks = lex_all(&mut z, r#"@"a\nb""#).unwrap();
        assert_eq!(toks[0].kind, TokenKind::LitString);
        assert_eq!(string::to_utf8(&z, toks[0].value), "a\\nb");
    }

    #[test]
    fn statement_sequence() {
        let mut z = Context::for_tests();
        let toks = lex_all(&mut z, "foo_1 = 2").unwrap();
        let kinds: Vec<TokenKind> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Identifier, TokenKind::Eql, TokenKind::LitInt, TokenKind::Eos]
        );
        assert_eq!(symbol::bytes(&z, toks[0].value), b"foo_1");
        assert_eq!(toks[2].value.as_smallint(), Some(2));
    }

    #[test]
    fn comments_swallow_the_line() {
        let mut z = Context::for_tests();
        let toks = lex_all(&mut z, "# comment\n1").unwrap();
        assert_eq!(toks[0].kind, TokenKind::LitInt);
        assert_eq!(toks[0].value.as_smallint(), Some(1));
    }

    #[test]
    fn operators_longest_match() {
        let mut z = Context::for_tests();
        let toks = lex_all(&mut z, "<<=").unwrap();
        assert_eq!(toks[0].kind, TokenKind::ShlEql);
        let toks = lex_all(&mut z, "...").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Ellipsis);
        let source = "< <= << <- - -= -> . .. ...";
        let toks = lex_all(&mut z, source).unwrap();
        let kinds: Vec<TokenKind> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::Shl,
                TokenKind::LArrow,
                TokenKind::Sub,
                TokenKind::SubEql,
                TokenKind::RArrow,
                TokenKind::Period,
                TokenKind::DotDot,
                TokenKind::Ellipsis,
                TokenKind::Eos,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut z = Context::for_tests();
        let err = lex_all(&mut z, "\"unterminated").unwrap_err();
        assert!(err.message.contains("unexpected end"));
    }

    #[test]
    fn keywords_and_identifiers() {
        let mut z = Context::for_tests();
        let toks = lex_all(&mut z, "while weile wĥile").unwrap();
        assert_eq!(toks[0].kind, TokenKind::KwWhile);
        assert_eq!(toks[1].kind, TokenKind::Identifier);
        assert_eq!(toks[2].kind, TokenKind::Identifier);
        assert_eq!(symbol::bytes(&z, toks[2].value), "wĥile".as_bytes());
    }

    #[test]
    fn positions_are_one_based_and_inclusive() {
        let mut z = Context::for_tests();
        let toks = lex_all(&mut z, "ab + 12\ncd").unwrap();
        let ab = toks[0];
        assert_eq!((ab.line0, ab.column0, ab.line1, ab.column1), (1, 1, 1, 2));
        let plus = toks[1];
        assert_eq!((plus.line0, plus.column0, plus.line1, plus.column1), (1, 4, 1, 4));
        let twelve = toks[2];
        assert_eq!((twelve.line0, twelve.column0, twelve.line1, twelve.column1), (1, 6, 1, 7));
        let eos = toks[3];
        assert_eq!(eos.kind, TokenKind::Eos);
        assert_eq!((eos.line0, eos.column0), (1, 8));
        let cd = toks[4];
        assert_eq!((cd.line0, cd.column0, cd.line1, cd.column1), (2, 1, 2, 2));
    }

    #[test]
    fn number_followed_by_range_operator() {
        let mut z = Context::for_tests();
        let toks = lex_all(&mut z, "1..2").unwrap();
        let kinds: Vec<TokenKind> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::LitInt, TokenKind::DotDot, TokenKind::LitInt, TokenKind::Eos]
        );
    }

    #[test]
    fn line_continuation() {
        let mut z = Context::for_tests();
        let toks = lex_all(&mut z, "1 \\\n2").unwrap();
        let kinds: Vec<TokenKind> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TokenKind::LitInt, TokenKind::LitInt, TokenKind::Eos]);
    }

    #[test]
    fn eol_can_be_ignored() {
        let mut z = Context::for_tests();
        let input = stream::new_bytes(&mut z, b"1\n2\n".to_vec());
        let mut lexer = Lexer::new();
        lexer.start(&mut z, input);
        assert_eq!(lexer.next(&mut z).unwrap().kind, TokenKind::LitInt);
        lexer.ignore_eol_begin();
        assert_eq!(lexer.next(&mut z).unwrap().kind, TokenKind::LitInt);
        lexer.ignore_eol_end();
        assert_eq!(lexer.next(&mut z).unwrap().kind, TokenKind::Eos);
        lexer.finish(&mut z);
    }
}
