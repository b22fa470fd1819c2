//! The `Float` type: IEEE-754 double objects.

use crate::common::VmResult;
use crate::mem::AllocMode;
use crate::runtime::context::Context;
use crate::value::exception;
use crate::value::int;
use crate::value::obj::Body;
use crate::value::repr::{Value, SMALLINT_MAX};
use crate::value::string;
use crate::value::typeobj::{NativeFuncDef, NativeTypeDef, TypeLayout};

pub fn new(z: &mut Context, v: f64) -> Value {
    z.alloc(AllocMode::Auto, Body::Float(v))
}

pub fn is_float(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::Float(_))
}

/// The stored double; `None` for non-floats.
pub fn value(z: &Context, v: Value) -> Option<f64> {
    if v.is_smallint() {
        return None;
    }
    match z.mem.obj(v).body {
        Body::Float(f) => Some(f),
        _ => None,
    }
}

/// Numeric value of a float or integer operand, for mixed comparisons.
fn numeric(z: &Context, v: Value) -> Option<f64> {
    value(z, v).or_else(|| int::value_f64(z, v))
}

fn m_operator_equ(z: &mut Context) -> VmResult {
    let this = value(z, z.reg(1)).expect("Float method on a non-Float");
    let result = numeric(z, z.reg(2)) == Some(this);
    let val = z.bool_value(result);
    z.set_reg0(val);
    Ok(())
}

fn m_operator_cmp(z: &mut Context) -> VmResult {
    let this = value(z, z.reg(1)).expect("Float method on a non-Float");
    let other = numeric(z, z.reg(2));
    match other.and_then(|o| this.partial_cmp(&o)) {
        Some(ord) => {
            z.set_reg0(Value::smallint(ord as i64));
            Ok(())
        }
        None => {
            let (a, b) = (z.reg(1), z.reg(2));
            let exc = exception::unsupported_operation_bin(z, "<=>", a, b);
            Err(z.throw(exc))
        }
    }
}

fn m_hash(z: &mut Context) -> VmResult {
    let this = value(z, z.reg(1)).expect("Float method on a non-Float");
    let h = this.to_bits() as i64 & SMALLINT_MAX;
    z.set_reg0(Value::smallint(h));
    Ok(())
}

fn m_to_string(z: &mut Context) -> VmResult {
    let this = value(z, z.reg(1)).expect("Float method on a non-Float");
    let mut text = this.to_string();
    if !text.contains(['.', 'e', 'E', 'n', 'i']) {
        text.push_str(".0");
    }
    let s = string::new(z, &text);
    z.set_reg0(s);
    Ok(())
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Float",
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
