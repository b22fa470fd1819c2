//! The `Tuple` type: immutable, length fixed at creation.

use crate::mem::AllocMode;
use crate::runtime::context::Context;
use crate::value::obj::Body;
use crate::value::repr::Value;
use crate::value::typeobj::{NativeTypeDef, TypeLayout};

#[derive(Debug)]
pub struct TupleObj {
    pub elems: Box<[Value]>,
}

/// Create a tuple from a slice of elements.  The pending body is a GC root,
/// so the slice values need no separate publication.
pub fn new(z: &mut Context, elems: &[Value]) -> Value {
    if elems.is_empty() && z.globals.val_empty_tuple.is_object() {
        return z.globals.val_empty_tuple;
    }
    z.alloc(AllocMode::Auto, Body::Tuple(TupleObj { elems: elems.into() }))
}

pub fn is_tuple(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::Tuple(_))
}

pub fn length(z: &Context, v: Value) -> usize {
    match &z.mem.obj(v).body {
        Body::Tuple(t) => t.elems.len(),
        other => panic!("expected a Tuple, found {}", other.type_name()),
    }
}

pub fn get(z: &Context, v: Value, index: usize) -> Option<Value> {
    match &z.mem.obj(v).body {
        Body::Tuple(t) => t.elems.get(index).copied(),
        other => panic!("expected a Tuple, found {}", other.type_name()),
    }
}

pub fn elements(z: &Context, v: Value) -> Vec<Value> {
    match &z.mem.obj(v).body {
        Body::Tuple(t) => t.elems.to_vec(),
        other => panic!("expected a Tuple, found {}", other.type_name()),
    }
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Tuple",
    fields: &[],
    layout: TypeLayout::SlotsExtended,
    methods: &[],
    statics: &[],
};
