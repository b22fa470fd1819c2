//! The `Range` type: two signed integers, begin and inclusive end.

use crate::common::VmResult;
use crate::mem::AllocMode;
use crate::runtime::context::Context;
use crate::value::exception;
use crate::value::int;
use crate::value::obj::Body;
use crate::value::repr::Value;
use crate::value::typeobj::{NativeTypeDef, TypeLayout};

#[derive(Debug, Clone, Copy)]
pub struct RangeObj {
    pub begin: i64,
    /// Index of the last element (inclusive end).
    pub end: i64,
}

pub fn new(z: &mut Context, begin: i64, end: i64) -> Value {
    z.alloc(AllocMode::Auto, Body::Range(RangeObj { begin, end }))
}

/// Create a range from integer values, as the `..` / `...` operators do.
pub fn new_from_values(z: &mut Context, begin: Value, end: Value, exclude_end: bool) -> VmResult<Value> {
    let (Some(b), Some(e)) = (int::value_i64(z, begin), int::value_i64(z, end)) else {
        let exc = exception::unsupported_operation_bin(z, "..", begin, end);
        return Err(z.throw(exc));
    };
    Ok(new(z, b, if exclude_end { e - 1 } else { e }))
}

pub fn is_range(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::Range(_))
}

pub fn bounds(z: &Context, v: Value) -> (i64, i64) {
    match &z.mem.obj(v).body {
        Body::Range(r) => (r.begin, r.end),
        other => panic!("expected a Range, found {}", other.type_name()),
    }
}

pub fn length(z: &Context, v: Value) -> usize {
    let (begin, end) = bounds(z, v);
    if end < begin {
        0
    } else {
        (end - begin + 1) as usize
    }
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Range",
    fields: &[],
    layout: TypeLayout::BytesExtended,
    methods: &[],
    statics: &[],
};
