//! The `String` type: Unicode strings with an adaptive character width.
//!
//! The stored width is the minimum of 1, 2, or 4 bytes per character that
//! fits the largest code point in the string.

use crate::common::VmResult;
use crate::mem::AllocMode;
use crate::runtime::context::Context;
use crate::strutil;
use crate::value::obj::Body;
use crate::value::repr::{Value, SMALLINT_MAX};
use crate::value::typeobj::{NativeFuncDef, NativeTypeDef, TypeLayout};

/// Character storage, tagged by width.
#[derive(Debug, Clone)]
pub enum Chars {
    /// U+0000 ..= U+00FF
    C1(Vec<u8>),
    /// U+0000 ..= U+FFFF
    C2(Vec<u16>),
    /// U+0000 ..= U+10FFFF
    C4(Vec<u32>),
}

#[derive(Debug, Clone)]
pub struct StringObj {
    pub chars: Chars,
}

impl StringObj {
    pub fn from_code_points(codes: &[u32]) -> StringObj {
        let max = codes.iter().copied().max().unwrap_or(0);
        let chars = if max <= 0xff {
            Chars::C1(codes.iter().map(|&c| c as u8).collect())
        } else if max <= 0xffff {
            Chars::C2(codes.iter().map(|&c| c as u16).collect())
        } else {
            Chars::C4(codes.to_vec())
        };
        StringObj { chars }
    }

    pub fn len(&self) -> usize {
        match &self.chars {
            Chars::C1(v) => v.len(),
            Chars::C2(v) => v.len(),
            Chars::C4(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per stored character.
    pub fn width(&self) -> usize {
        match &self.chars {
            Chars::C1(_) => 1,
            Chars::C2(_) => 2,
            Chars::C4(_) => 4,
        }
    }

    pub fn code_points(&self) -> Vec<u32> {
        match &self.chars {
            Chars::C1(v) => v.iter().map(|&c| c as u32).collect(),
            Chars::C2(v) => v.iter().map(|&c| c as u32).collect(),
            Chars::C4(v) => v.clone(),
        }
    }

    pub fn to_utf8(&self) -> String {
        let mut out = String::new();
        let mut buf = [0u8; 4];
        for c in self.code_points() {
            let n = strutil::u8char_from_code(c, &mut buf);
            debug_assert!(n != 0);
            out.push_str(std::str::from_utf8(&buf[..n]).unwrap());
        }
        out
    }

    pub fn hash(&self) -> u64 {
        self.code_points()
            .iter()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, &c| (h ^ c as u64).wrapping_mul(0x0100_0000_01b3))
    }
}

/* ----- constructors and accessors ------------------------------------------ */

/// Create a string from UTF-8 text.
pub fn new(z: &mut Context, s: &str) -> Value {
    if s.is_empty() && z.globals.val_empty_string.is_object() {
        return z.globals.val_empty_string;
    }
    let codes: Vec<u32> = s.chars().map(|c| c as u32).collect();
    z.alloc(AllocMode::Auto, Body::String(StringObj::from_code_points(&codes)))
}

/// Create a string from raw bytes that should be UTF-8.
/// On failure, returns the offset where decoding stopped.
pub fn from_utf8(z: &mut Context, bytes: &[u8]) -> Result<Value, usize> {
    let mut codes = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        match strutil::u8char_to_code(&bytes[pos..]) {
            Some((c, n)) => {
                codes.push(c);
                pos += n;
            }
            None => return Err(pos),
        }
    }
    if codes.is_empty() && z.globals.val_empty_string.is_object() {
        return Ok(z.globals.val_empty_string);
    }
    Ok(z.alloc(AllocMode::Auto, Body::String(StringObj::from_code_points(&codes))))
}

/// Create a one-character string.
pub fn from_char(z: &mut Context, c: u32) -> Value {
    z.alloc(AllocMode::Auto, Body::String(StringObj::from_code_points(&[c])))
}

/// Create a string from code points, as the lexer accumulates them.
pub fn from_code_points(z: &mut Context, codes: &[u32]) -> Value {
    if codes.is_empty() && z.globals.val_empty_string.is_object() {
        return z.globals.val_empty_string;
    }
    z.alloc(AllocMode::Auto, Body::String(StringObj::from_code_points(codes)))
}

fn get(z: &Context, v: Value) -> &StringObj {
    match &z.mem.obj(v).body {
        Body::String(s) => s,
        other => panic!("expected a String, found {}", other.type_name()),
    }
}

pub fn is_string(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::String(_))
}

/// Number of characters (code points).
pub fn length(z: &Context, v: Value) -> usize {
    get(z, v).len()
}

/// Bytes per stored character: 1, 2, or 4.
pub fn width(z: &Context, v: Value) -> usize {
    get(z, v).width()
}

/// The UTF-8 rendering of the string.
pub fn to_utf8(z: &Context, v: Value) -> String {
    get(z, v).to_utf8()
}

pub fn hash(z: &Context, v: Value) -> u64 {
    get(z, v).hash()
}

/// Content equality of two strings.
pub fn content_eq(z: &Context, a: Value, b: Value) -> bool {
    a == b || get(z, a).code_points() == get(z, b).code_points()
}

/// Concatenate two strings into a new one.
pub fn concat(z: &mut Context, a: Value, b: Value) -> Value {
    let mut codes = get(z, a).code_points();
    codes.extend(get(z, b).code_points());
    z.alloc(AllocMode::Auto, Body::String(StringObj::from_code_points(&codes)))
}

/* ----- type definition ----------------------------------------------------- */

fn m_operator_equ(z: &mut Context) -> VmResult {
    let (this, other) = (z.reg(1), z.reg(2));
    let result = is_string(z, other) && content_eq(z, this, other);
    let val = z.bool_value(result);
    z.set_reg0(val);
    Ok(())
}

fn m_hash(z: &mut Context) -> VmResult {
    let this = z.reg(1);
    let h = hash(z, this) as i64 & SMALLINT_MAX;
    z.set_reg0(Value::smallint(h));
    Ok(())
}

fn m_to_string(z: &mut Context) -> VmResult {
    let this = z.reg(1);
    z.set_reg0(this);
    Ok(())
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "String",
    fields: &[],
    layout: TypeLayout::BytesExtended,
    methods: &[
        NativeFuncDef { name: "==", meta: (2, 0, 2), code: m_operator_equ },
        NativeFuncDef { name: "hash", meta: (1, 0, 1), code: m_hash },
        NativeFuncDef { name: "to_string", meta: (1, 1, 2), code: m_to_string },
    ],
    statics: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Context;

    #[test]
    fn utf8_round_trip() {
        let mut z = Context::for_tests();
        for s in ["", "hello", "naïve", "\u{0100}bc", "a\u{10000}b", "¡☃!"] {
            let v = new(&mut z, s);
            assert_eq!(to_utf8(&z, v), s);
            assert_eq!(length(&z, v), s.chars().count());
        }
    }

    #[test]
    fn from_utf8_reports_bad_offset() {
        let mut z = Context::for_tests();
        assert!(from_utf8(&mut z, b"ok").is_ok());
        assert_eq!(from_utf8(&mut z, b"ab\x80"), Err(2));
    }

    #[test]
    fn width_selection_is_minimal() {
        let mut z = Context::for_tests();
        let narrow = new(&mut z, "aÿ");
        assert_eq!(width(&z, narrow), 1);
        let wide2 = new(&mut z, "a\u{0100}");
        assert_eq!(width(&z, wide2), 2);
        let wide4 = new(&mut z, "a\u{10000}");
        assert_eq!(width(&z, wide4), 4);
    }

    #[test]
    fn concat_promotes_width() {
        let mut z = Context::for_tests();
        let a = new(&mut z, "ab");
        let b = new(&mut z, "\u{10123}");
        let c = concat(&mut z, a, b);
        assert_eq!(to_utf8(&z, c), "ab\u{10123}");
        assert_eq!(width(&z, c), 4);
    }
}
