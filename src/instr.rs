//! Bytecode instruction words.
//!
//! An instruction is a 32-bit word.  The low 7 bits hold the opcode; the
//! remaining 25 bits hold the operands in one of the shapes below.
//!
//! ```txt
//!  31                    16 15       7 6     0
//! +------------------------+----------+-------+
//! |         Aw / Asw (25 bits)        | opcode|   Aw / Asw
//! +------------------------+----------+-------+
//! |       Bw (16)          |  A (9)   | opcode|   ABw / AsBw / ABsw
//! +-----------+------------+----------+-------+
//! |  C (8)    |   B (8)    |  A (9)   | opcode|   ABC / AsBC / ABsCs
//! +-----------+------------+----------+-------+
//! ```
//!
//! The constructor/accessor pairs below form a bijection over their declared
//! operand ranges; ranges are checked in debug builds.

use derive_more::Display;
use num_enum::TryFromPrimitive;

/// An unsigned integer type that holds one instruction.
pub type InstrWord = u32;

/// Number of encodable opcodes (the opcode field is 7 bits wide).
pub const OPCODE_COUNT: u32 = 0x80;

/// Instruction opcodes.  Gaps in the numbering are reserved for future
/// arithmetic, comparison, control-flow, and call operations.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum OpCode {
    #[display("NOP")]
    Nop = 0x00,
    #[display("ARG")]
    Arg = 0x01,
    #[display("LDNIL")]
    LdNil = 0x04,
    #[display("LDBLN")]
    LdBln = 0x05,
    #[display("LDCON")]
    LdCon = 0x06,
    #[display("LDSYM")]
    LdSym = 0x07,
    #[display("MKINT")]
    MkInt = 0x08,
    #[display("MKFLT")]
    MkFlt = 0x09,
    #[display("MKTUP")]
    MkTup = 0x0a,
    #[display("MKARR")]
    MkArr = 0x0b,
    #[display("MKMAP")]
    MkMap = 0x0c,
    #[display("THR")]
    Thr = 0x10,
    #[display("RETNIL")]
    RetNil = 0x11,
    #[display("RET")]
    Ret = 0x12,
}

/// Operand shapes.  The letter names an operand slot; a trailing `s` marks a
/// signed field; `w` marks a wide field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandShape {
    /// No operands.
    X,
    /// 25-bit unsigned.
    Aw,
    /// 25-bit signed (jump offsets).
    Asw,
    /// 9-bit unsigned, 16-bit unsigned.
    ABw,
    /// 9-bit signed, 16-bit unsigned.
    AsBw,
    /// 9-bit unsigned, 16-bit signed.
    ABsw,
    /// 9-bit unsigned, two 8-bit unsigned.
    ABC,
    /// 9-bit signed, two 8-bit unsigned.
    AsBC,
    /// 9-bit unsigned, two 8-bit signed.
    ABsCs,
}

impl OpCode {
    /// The operand shape this opcode is decoded with.
    pub fn shape(self) -> OperandShape {
        use OpCode::*;
        match self {
            Nop | Arg | Thr | RetNil | Ret => OperandShape::Aw,
            LdNil | LdBln | LdCon | LdSym => OperandShape::ABw,
            MkInt => OperandShape::ABsw,
            MkTup | MkArr | MkMap => OperandShape::ABC,
            MkFlt => OperandShape::ABsCs,
        }
    }
}

pub const U25_MAX: u32 = (1 << 25) - 1;
pub const I25_MIN: i32 = -(1 << 24);
pub const I25_MAX: i32 = (1 << 24) - 1;
pub const U16_MAX: u32 = u16::MAX as u32;
pub const I16_MIN: i32 = i16::MIN as i32;
pub const I16_MAX: i32 = i16::MAX as i32;
pub const U9_MAX: u32 = (1 << 9) - 1;
pub const I9_MIN: i32 = -(1 << 8);
pub const I9_MAX: i32 = (1 << 8) - 1;
pub const U8_MAX: u32 = u8::MAX as u32;
pub const I8_MIN: i32 = i8::MIN as i32;
pub const I8_MAX: i32 = i8::MAX as i32;

/// Extract the raw opcode bits of an instruction word.
#[inline]
pub fn opcode_bits(w: InstrWord) -> u8 {
    (w & 0x7f) as u8
}

#[inline]
pub fn make_aw(op: OpCode, aw: u32) -> InstrWord {
    debug_assert!(aw <= U25_MAX);
    op as u32 | aw << 7
}

#[inline]
pub fn extract_aw(w: InstrWord) -> u32 {
    w >> 7
}

#[inline]
pub fn make_asw(op: OpCode, asw: i32) -> InstrWord {
    debug_assert!((I25_MIN..=I25_MAX).contains(&asw));
    op as u32 | ((asw as u32) & U25_MAX) << 7
}

#[inline]
pub fn extract_asw(w: InstrWord) -> i32 {
    (w as i32) >> 7
}

#[inline]
pub fn make_abw(op: OpCode, a: u32, bw: u32) -> InstrWord {
    debug_assert!(a <= U9_MAX && bw <= U16_MAX);
    op as u32 | a << 7 | bw << 16
}

#[inline]
pub fn extract_abw(w: InstrWord) -> (u32, u32) {
    (w >> 7 & 0x1ff, w >> 16)
}

#[inline]
pub fn make_asbw(op: OpCode, a: i32, bw: u32) -> InstrWord {
    debug_assert!((I9_MIN..=I9_MAX).contains(&a) && bw <= U16_MAX);
    op as u32 | ((a as u32) & 0x1ff) << 7 | bw << 16
}

#[inline]
pub fn extract_asbw(w: InstrWord) -> (i32, u32) {
    (((w as i32) << 16) >> 23, w >> 16)
}

#[inline]
pub fn make_absw(op: OpCode, a: u32, bsw: i32) -> InstrWord {
    debug_assert!(a <= U9_MAX && (I16_MIN..=I16_MAX).contains(&bsw));
    op as u32 | a << 7 | ((bsw as u32) & U16_MAX) << 16
}

#[inline]
pub fn extract_absw(w: InstrWord) -> (u32, i32) {
    (w >> 7 & 0x1ff, (w as i32) >> 16)
}

#[inline]
pub fn make_abc(op: OpCode, a: u32, b: u32, c: u32) -> InstrWord {
    debug_assert!(a <= U9_MAX && b <= U8_MAX && c <= U8_MAX);
    op as u32 | a << 7 | b << 16 | c << 24
}

#[inline]
pub fn extract_abc(w: InstrWord) -> (u32, u32, u32) {
    (w >> 7 & 0x1ff, w >> 16 & 0xff, w >> 24)
}

#[inline]
pub fn make_asbc(op: OpCode, a: i32, b: u32, c: u32) -> InstrWord {
    debug_assert!((I9_MIN..=I9_MAX).contains(&a) && b <= U8_MAX && c <= U8_MAX);
    op as u32 | ((a as u32) & 0x1ff) << 7 | b << 16 | c << 24
}

#[inline]
pub fn extract_asbc(w: InstrWord) -> (i32, u32, u32) {
    (((w as i32) << 16) >> 23, w >> 16 & 0xff, w >> 24)
}

#[inline]
pub fn make_abscs(op: OpCode, a: u32, bs: i32, cs: i32) -> InstrWord {
    debug_assert!(a <= U9_MAX);
    debug_assert!((I8_MIN..=I8_MAX).contains(&bs) && (I8_MIN..=I8_MAX).contains(&cs));
    op as u32 | a << 7 | ((bs as u32) & 0xff) << 16 | ((cs as u32) & 0xff) << 24
}

#[inline]
pub fn extract_abscs(w: InstrWord) -> (u32, i32, i32) {
    (w >> 7 & 0x1ff, ((w as i32) << 8) >> 24, (w as i32) >> 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPS: [OpCode; 14] = [
        OpCode::Nop,
        OpCode::Arg,
        OpCode::LdNil,
        OpCode::LdBln,
        OpCode::LdCon,
        OpCode::LdSym,
        OpCode::MkInt,
        OpCode::MkFlt,
        OpCode::MkTup,
        OpCode::MkArr,
        OpCode::MkMap,
        OpCode::Thr,
        OpCode::RetNil,
        OpCode::Ret,
    ];

    const U25S: [u32; 5] = [0, 1, 12345, U25_MAX - 1, U25_MAX];
    const I25S: [i32; 6] = [I25_MIN, -1, 0, 1, 54321, I25_MAX];
    const U16S: [u32; 4] = [0, 1, 0x1234, U16_MAX];
    const I16S: [i32; 5] = [I16_MIN, -1, 0, 1, I16_MAX];
    const U9S: [u32; 4] = [0, 1, 300, U9_MAX];
    const I9S: [i32; 5] = [I9_MIN, -1, 0, 1, I9_MAX];
    const U8S: [u32; 4] = [0, 1, 200, U8_MAX];
    const I8S: [i32; 5] = [I8_MIN, -1, 0, 1, I8_MAX];

    fn opcode_of(w: InstrWord) -> OpCode {
        OpCode::try_from(opcode_bits(w)).unwrap()
    }

    #[test]
    fn aw_bijection() {
        for &op in &OPS {
            for &aw in &U25S {
                let w = make_aw(op, aw);
                assert_eq!(opcode_of(w), op);
                assert_eq!(extract_aw(w), aw);
            }
        }
    }

    #[test]
    fn asw_bijection() {
        for &op in &OPS {
            for &asw in &I25S {
                let w = make_asw(op, asw);
                assert_eq!(opcode_of(w), op);
                assert_eq!(extract_asw(w), asw);
            }
        }
    }

    #[test]
    fn abw_bijection() {
        for &a in &U9S {
            for &bw in &U16S {
                let w = make_abw(OpCode::LdCon, a, bw);
                assert_eq!(opcode_of(w), OpCode::LdCon);
                assert_eq!(extract_abw(w), (a, bw));
            }
        }
    }

    #[test]
    fn asbw_bijection() {
        for &a in &I9S {
            for &bw in &U16S {
                let w = make_asbw(OpCode::Nop, a, bw);
                assert_eq!(extract_asbw(w), (a, bw));
            }
        }
    }

    #[test]
    fn absw_bijection() {
        for &a in &U9S {
            for &bsw in &I16S {
                let w = make_absw(OpCode::MkInt, a, bsw);
                assert_eq!(extract_absw(w), (a, bsw));
            }
        }
    }

    #[test]
    fn abc_bijection() {
        for &a in &U9S {
            for &b in &U8S {
                for &c in &U8S {
                    let w = make_abc(OpCode::MkTup, a, b, c);
                    assert_eq!(extract_abc(w), (a, b, c));
                }
            }
        }
    }

    #[test]
    fn asbc_bijection() {
        for &a in &I9S {
            for &b in &U8S {
                for &c in &U8S {
                    let w = make_asbc(OpCode::Nop, a, b, c);
                    assert_eq!(extract_asbc(w), (a, b, c));
                }
            }
        }
    }

    #[test]
    fn abscs_bijection() {
        for &a in &U9S {
            for &bs in &I8S {
                for &cs in &I8S {
                    let w = make_abscs(OpCode::MkFlt, a, bs, cs);
                    assert_eq!(extract_abscs(w), (a, bs, cs));
                }
            }
        }
    }

    #[test]
    fn illegal_opcode_is_rejected() {
        assert!(OpCode::try_from(0x02u8).is_err());
        assert!(OpCode::try_from(0x7fu8).is_err());
        assert!(OpCode::try_from(OpCode::Ret as u8).is_ok());
    }
}
