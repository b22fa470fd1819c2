//! The `Int` type: smallints encoded in the value word, arbitrary-precision
//! integers on the heap.  Arithmetic fast-paths smallints and promotes to a
//! heap object when a result leaves the smallint range.

use crate::common::VmResult;
use crate::mem::AllocMode;
use crate::runtime::context::Context;
use crate::value::exception;
use crate::value::obj::Body;
use crate::value::repr::{Value, SMALLINT_MAX};
use crate::value::string;
use crate::value::typeobj::{NativeFuncDef, NativeTypeDef, TypeLayout};

/// Heap integer: sign and little-endian 32-bit limb magnitude.
/// The magnitude is normalized (no high zero limbs) and never zero; values
/// inside smallint range are not boxed.
#[derive(Debug, Clone)]
pub struct IntObj {
    pub neg: bool,
    pub mag: Vec<u32>,
}

impl IntObj {
    pub fn hash(&self) -> u64 {
        self.mag.iter().fold(0u64, |h, &limb| h.wrapping_mul(0x0100_0000_01b3).wrapping_add(limb as u64))
    }

    pub fn to_f64(&self) -> f64 {
        let mut x = 0.0f64;
        for &limb in self.mag.iter().rev() {
            x = x * 4294967296.0 + limb as f64;
        }
        if self.neg {
            -x
        } else {
            x
        }
    }

    fn to_decimal(&self) -> String {
        let mut digits = Vec::new();
        let mut mag = self.mag.clone();
        while !mag.is_empty() {
            let rem = mag_divmod_small(&mut mag, 10);
            digits.push(b'0' + rem as u8);
        }
        let mut out = String::with_capacity(digits.len() + 1);
        if self.neg {
            out.push('-');
        }
        for &d in digits.iter().rev() {
            out.push(d as char);
        }
        out
    }
}

/* ----- magnitude arithmetic ----------------------------------------------- */

fn mag_normalize(mag: &mut Vec<u32>) {
    while mag.last() == Some(&0) {
        mag.pop();
    }
}

fn mag_from_u128(mut v: u128) -> Vec<u32> {
    let mut mag = Vec::new();
    while v != 0 {
        mag.push(v as u32);
        v >>= 32;
    }
    mag
}

fn mag_cmp(a: &[u32], b: &[u32]) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.iter().rev().cmp(b.iter().rev()))
}

fn mag_add(a: &[u32], b: &[u32]) -> Vec<u32> {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut out = Vec::with_capacity(long.len() + 1);
    let mut carry = 0u64;
    for i in 0..long.len() {
        let sum = long[i] as u64 + short.get(i).copied().unwrap_or(0) as u64 + carry;
        out.push(sum as u32);
        carry = sum >> 32;
    }
    if carry != 0 {
        out.push(carry as u32);
    }
    out
}

/// `a - b`; requires `a >= b`.
fn mag_sub(a: &[u32], b: &[u32]) -> Vec<u32> {
    debug_assert!(mag_cmp(a, b) != std::cmp::Ordering::Less);
    let mut out = Vec::with_capacity(a.len());
    let mut borrow = 0i64;
    for i in 0..a.len() {
        let d = a[i] as i64 - b.get(i).copied().unwrap_or(0) as i64 - borrow;
        if d < 0 {
            out.push((d + (1i64 << 32)) as u32);
            borrow = 1;
        } else {
            out.push(d as u32);
            borrow = 0;
        }
    }
    debug_assert_eq!(borrow, 0);
    mag_normalize(&mut out);
    out
}

fn mag_mul(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = vec![0u32; a.len() + b.len()];
    for (i, &x) in a.iter().enumerate() {
        let mut carry = 0u64;
        for (j, &y) in b.iter().enumerate() {
            let t = x as u64 * y as u64 + out[i + j] as u64 + carry;
            out[i + j] = t as u32;
            carry = t >> 32;
        }
        out[i + b.len()] = carry as u32;
    }
    mag_normalize(&mut out);
    out
}

/// `mag = mag * m + a`, in place.
fn mag_mul_add_small(mag: &mut Vec<u32>, m: u64, a: u64) {
    let mut carry = a;
    for limb in mag.iter_mut() {
        let t = *limb as u64 * m + (carry & 0xffff_ffff);
        let high = carry >> 32;
        *limb = t as u32;
        carry = (t >> 32) + high;
    }
    while carry != 0 {
        mag.push(carry as u32);
        carry >>= 32;
    }
}

/// Divide the magnitude in place and return the remainder.
fn mag_divmod_small(mag: &mut Vec<u32>, d: u64) -> u64 {
    let mut rem = 0u64;
    for limb in mag.iter_mut().rev() {
        let t = rem << 32 | *limb as u64;
        *limb = (t / d) as u32;
        rem = t % d;
    }
    mag_normalize(mag);
    rem
}

/* ----- constructors and accessors ------------------------------------------ */

/// Make an integer value from sign and magnitude, unboxing when it fits.
pub fn from_sign_mag(z: &mut Context, neg: bool, mut mag: Vec<u32>) -> Value {
    mag_normalize(&mut mag);
    if mag.len() <= 2 {
        let abs = mag.iter().rev().fold(0u64, |acc, &l| acc << 32 | l as u64);
        let v = if neg { -(abs as i128) } else { abs as i128 };
        if let Ok(small) = i64::try_from(v) {
            if let Some(val) = Value::smallint_checked(small) {
                return val;
            }
        }
    }
    z.alloc(AllocMode::Auto, Body::Int(IntObj { neg, mag }))
}

pub fn new_i64(z: &mut Context, v: i64) -> Value {
    match Value::smallint_checked(v) {
        Some(val) => val,
        None => from_sign_mag(z, v < 0, mag_from_u128(v.unsigned_abs() as u128)),
    }
}

pub fn new_i128(z: &mut Context, v: i128) -> Value {
    if let Ok(small) = i64::try_from(v) {
        if let Some(val) = Value::smallint_checked(small) {
            return val;
        }
    }
    from_sign_mag(z, v < 0, mag_from_u128(v.unsigned_abs()))
}

pub fn is_int(z: &Context, v: Value) -> bool {
    v.is_smallint() || matches!(z.mem.obj(v).body, Body::Int(_))
}

/// Sign and magnitude of an integer value; `None` for non-integers.
fn parts(z: &Context, v: Value) -> Option<(bool, Vec<u32>)> {
    if let Some(i) = v.as_smallint() {
        return Some((i < 0, mag_from_u128(i.unsigned_abs() as u128)));
    }
    match &z.mem.obj(v).body {
        Body::Int(i) => Some((i.neg, i.mag.clone())),
        _ => None,
    }
}

/// The value as an `i64`, when it fits.
pub fn value_i64(z: &Context, v: Value) -> Option<i64> {
    if let Some(i) = v.as_smallint() {
        return Some(i);
    }
    match &z.mem.obj(v).body {
        Body::Int(i) if i.mag.len() <= 2 => {
            let abs = i.mag.iter().rev().fold(0u64, |acc, &l| acc << 32 | l as u64);
            let signed = if i.neg { -(abs as i128) } else { abs as i128 };
            i64::try_from(signed).ok()
        }
        _ => None,
    }
}

/// The value as a double; `None` for non-integers.
pub fn value_f64(z: &Context, v: Value) -> Option<f64> {
    if let Some(i) = v.as_smallint() {
        return Some(i as f64);
    }
    match &z.mem.obj(v).body {
        Body::Int(i) => Some(i.to_f64()),
        _ => None,
    }
}

pub fn hash_i64(v: i64) -> u64 {
    v.unsigned_abs()
}

/// Hash of an integer value (smallint or boxed).
pub fn hash_value(z: &Context, v: Value) -> u64 {
    if let Some(i) = v.as_smallint() {
        return hash_i64(i);
    }
    match &z.mem.obj(v).body {
        Body::Int(i) => i.hash(),
        _ => 0,
    }
}

/// Decimal rendering.
pub fn to_decimal(z: &Context, v: Value) -> String {
    if let Some(i) = v.as_smallint() {
        return i.to_string();
    }
    match &z.mem.obj(v).body {
        Body::Int(i) => i.to_decimal(),
        _ => "??".to_string(),
    }
}

/* ----- arithmetic ---------------------------------------------------------- */

/// `acc * m + a` for a non-negative integer accumulator.  This is the
/// mul-and-add step the lexer uses to build numeric literals.
pub fn mul_add_small(z: &mut Context, acc: Value, m: u64, a: u64) -> Value {
    if let Some(i) = acc.as_smallint() {
        debug_assert!(i >= 0);
        let wide = i as i128 * m as i128 + a as i128;
        return new_i128(z, wide);
    }
    let mut mag = match &z.mem.obj(acc).body {
        Body::Int(i) => {
            debug_assert!(!i.neg);
            i.mag.clone()
        }
        _ => unreachable!("mul_add_small on a non-integer"),
    };
    mag_mul_add_small(&mut mag, m, a);
    from_sign_mag(z, false, mag)
}

fn signed_mag_op(z: &mut Context, an: bool, am: Vec<u32>, bn: bool, bm: Vec<u32>, sub: bool) -> Value {
    let bn = bn != sub;
    if an == bn {
        from_sign_mag(z, an, mag_add(&am, &bm))
    } else {
        match mag_cmp(&am, &bm) {
            std::cmp::Ordering::Equal => Value::ZERO,
            std::cmp::Ordering::Greater => from_sign_mag(z, an, mag_sub(&am, &bm)),
            std::cmp::Ordering::Less => from_sign_mag(z, bn, mag_sub(&bm, &am)),
        }
    }
}

fn arith_operands(z: &mut Context, op: &'static str, a: Value, b: Value) -> VmResult<((bool, Vec<u32>), (bool, Vec<u32>))> {
    match (parts(z, a), parts(z, b)) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => {
            let exc = exception::unsupported_operation_bin(z, op, a, b);
            Err(z.throw(exc))
        }
    }
}

pub fn add(z: &mut Context, a: Value, b: Value) -> VmResult<Value> {
    if let (Some(x), Some(y)) = (a.as_smallint(), b.as_smallint()) {
        return Ok(new_i128(z, x as i128 + y as i128));
    }
    let ((an, am), (bn, bm)) = arith_operands(z, "+", a, b)?;
    Ok(signed_mag_op(z, an, am, bn, bm, false))
}

pub fn sub(z: &mut Context, a: Value, b: Value) -> VmResult<Value> {
    if let (Some(x), Some(y)) = (a.as_smallint(), b.as_smallint()) {
        return Ok(new_i128(z, x as i128 - y as i128));
    }
    let ((an, am), (bn, bm)) = arith_operands(z, "-", a, b)?;
    Ok(signed_mag_op(z, an, am, bn, bm, true))
}

pub fn mul(z: &mut Context, a: Value, b: Value) -> VmResult<Value> {
    if let (Some(x), Some(y)) = (a.as_smallint(), b.as_smallint()) {
        return Ok(new_i128(z, x as i128 * y as i128));
    }
    let ((an, am), (bn, bm)) = arith_operands(z, "*", a, b)?;
    if am.is_empty() || bm.is_empty() {
        return Ok(Value::ZERO);
    }
    Ok(from_sign_mag(z, an != bn, mag_mul(&am, &bm)))
}

pub fn neg(z: &mut Context, a: Value) -> VmResult<Value> {
    if let Some(x) = a.as_smallint() {
        return Ok(new_i128(z, -(x as i128)));
    }
    match parts(z, a) {
        Some((n, m)) => Ok(from_sign_mag(z, !n, m)),
        None => {
            let exc = exception::unsupported_operation_un(z, "-", a);
            Err(z.throw(exc))
        }
    }
}

/// Numeric ordering of two integer values.
pub fn cmp_values(z: &Context, a: Value, b: Value) -> Option<std::cmp::Ordering> {
    use std::cmp::Ordering;
    if let (Some(x), Some(y)) = (a.as_smallint(), b.as_smallint()) {
        return Some(x.cmp(&y));
    }
    let (an, am) = parts(z, a)?;
    let (bn, bm) = parts(z, b)?;
    Some(match (an, bn) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (false, false) => mag_cmp(&am, &bm),
        (true, true) => mag_cmp(&bm, &am),
    })
}

/* ----- type definition ----------------------------------------------------- */

fn m_operator_equ(z: &mut Context) -> VmResult {
    let (this, other) = (z.reg(1), z.reg(2));
    let result = cmp_values(z, this, other) == Some(std::cmp::Ordering::Equal);
    let val = z.bool_value(result);
    z.set_reg0(val);
    Ok(())
}

fn m_operator_cmp(z: &mut Context) -> VmResult {
    let (this, other) = (z.reg(1), z.reg(2));
    match cmp_values(z, this, other) {
        Some(ord) => {
            z.set_reg0(Value::smallint(ord as i64));
            Ok(())
        }
        None => {
            let exc = exception::unsupported_operation_bin(z, "<=>", this, other);
            Err(z.throw(exc))
        }
    }
}

fn m_hash(z: &mut Context) -> VmResult {
    let this = z.reg(1);
    let h = hash_value(z, this) as i64 & SMALLINT_MAX;
    z.set_reg0(Value::smallint(h));
    Ok(())
}

fn m_to_string(z: &mut Context) -> VmResult {
    let this = z.reg(1);
    let text = to_decimal(z, this);
    let s = string::new(z, &text);
    z.set_reg0(s);
    Ok(())
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Int",
    fields: &[],
    layout: TypeLayout::BytesExtended,
    methods: &[
        NativeFuncDef { name: "==", meta: (2, 0, 2), code: m_operator_equ },
        NativeFuncDef { name: "<=>", meta: (2, 0, 2), code: m_operator_cmp },
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
    fn smallint_identity_in_range() {
        let mut z = Context::for_tests();
        let a = new_i64(&mut z, 12345);
        let b = new_i64(&mut z, 12345);
        assert!(a.is_smallint());
        assert_eq!(a, b);
        assert_eq!(value_i64(&z, a), Some(12345));
    }

    #[test]
    fn overflow_promotes_to_bigint() {
        let mut z = Context::for_tests();
        let a = Value::smallint(SMALLINT_MAX);
        let b = Value::smallint(1);
        let sum = add(&mut z, a, b).unwrap();
        assert!(sum.is_object());
        assert_eq!(to_decimal(&z, sum), (SMALLINT_MAX as i128 + 1).to_string());
    }

    #[test]
    fn big_arithmetic_round_trip() {
        let mut z = Context::for_tests();
        let big = mul_add_small(&mut z, Value::smallint(SMALLINT_MAX), 1000, 7);
        assert!(big.is_object());
        let expect = SMALLINT_MAX as i128 * 1000 + 7;
        assert_eq!(to_decimal(&z, big), expect.to_string());
        let back = sub(&mut z, big, Value::smallint(7)).unwrap();
        assert_eq!(to_decimal(&z, back), (expect - 7).to_string());
    }

    #[test]
    fn negative_results_shrink_back() {
        let mut z = Context::for_tests();
        let big = new_i128(&mut z, SMALLINT_MAX as i128 + 5);
        let small = sub(&mut z, big, Value::smallint(10)).unwrap();
        assert!(small.is_smallint());
        assert_eq!(small.as_smallint(), Some(SMALLINT_MAX - 5));
    }

    #[test]
    fn comparisons() {
        let mut z = Context::for_tests();
        let big_pos = new_i128(&mut z, 1i128 << 80);
        let big_neg = neg(&mut z, big_pos).unwrap();
        assert_eq!(cmp_values(&z, big_neg, big_pos), Some(std::cmp::Ordering::Less));
        assert_eq!(cmp_values(&z, big_pos, Value::smallint(1)), Some(std::cmp::Ordering::Greater));
    }
}
