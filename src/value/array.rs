//! `ArraySlots` and `Array`.
//!
//! `ArraySlots` is the raw, length-tagged vector of object slots used as
//! backing storage for arrays, module variables, and function tables.
//! `Array` pairs an indirect `ArraySlots` with a logical length.

use crate::mem::AllocMode;
use crate::runtime::context::Context;
use crate::value::obj::Body;
use crate::value::repr::Value;
use crate::value::typeobj::{NativeTypeDef, TypeLayout};

#[derive(Debug)]
pub struct SlotsObj {
    pub slots: Vec<Value>,
}

#[derive(Debug)]
pub struct ArrayObj {
    /// The backing `ArraySlots` object.
    pub slots: Value,
    /// Logical element count; the backing store may be longer.
    pub len: usize,
}

/* ----- ArraySlots ----------------------------------------------------------- */

pub mod slots {
    use super::*;

    /// Allocate a slots object of `n` entries, zeroed to smallint 0.
    pub fn new(z: &mut Context, n: usize) -> Value {
        if n == 0 && z.globals.val_empty_slots.is_object() {
            return z.globals.val_empty_slots;
        }
        z.alloc(AllocMode::Auto, Body::ArraySlots(SlotsObj { slots: vec![Value::ZERO; n] }))
    }

    /// Allocate a slots object of `n` entries initialised from the contents
    /// of `src` (an existing slots object), zero-filled past its length.
    pub fn new_from(z: &mut Context, n: usize, src: Value) -> Value {
        let mut init = elements(z, src);
        init.resize(n, Value::ZERO);
        z.alloc(AllocMode::Auto, Body::ArraySlots(SlotsObj { slots: init }))
    }

    /// Allocate a slots object holding the given values.
    pub fn from_values(z: &mut Context, values: &[Value]) -> Value {
        if values.is_empty() && z.globals.val_empty_slots.is_object() {
            return z.globals.val_empty_slots;
        }
        z.alloc(AllocMode::Auto, Body::ArraySlots(SlotsObj { slots: values.to_vec() }))
    }

    pub fn length(z: &Context, v: Value) -> usize {
        match &z.mem.obj(v).body {
            Body::ArraySlots(s) => s.slots.len(),
            other => panic!("expected ArraySlots, found {}", other.type_name()),
        }
    }

    pub fn get(z: &Context, v: Value, index: usize) -> Value {
        match &z.mem.obj(v).body {
            Body::ArraySlots(s) => s.slots[index],
            other => panic!("expected ArraySlots, found {}", other.type_name()),
        }
    }

    pub fn set(z: &mut Context, v: Value, index: usize, value: Value) {
        match &mut z.mem.obj_mut(v).body {
            Body::ArraySlots(s) => s.slots[index] = value,
            other => panic!("expected ArraySlots, found {}", other.type_name()),
        }
        z.mem.write_barrier(v, value);
    }

    pub fn elements(z: &Context, v: Value) -> Vec<Value> {
        match &z.mem.obj(v).body {
            Body::ArraySlots(s) => s.slots.clone(),
            other => panic!("expected ArraySlots, found {}", other.type_name()),
        }
    }
}

/* ----- Array ---------------------------------------------------------------- */

/// Create an array holding the given elements.
pub fn new(z: &mut Context, elems: &[Value]) -> Value {
    let backing = slots::from_values(z, elems);
    z.alloc(AllocMode::Auto, Body::Array(ArrayObj { slots: backing, len: elems.len() }))
}

pub fn is_array(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::Array(_))
}

pub fn length(z: &Context, v: Value) -> usize {
    match &z.mem.obj(v).body {
        Body::Array(a) => a.len,
        other => panic!("expected an Array, found {}", other.type_name()),
    }
}

pub fn get(z: &Context, v: Value, index: usize) -> Option<Value> {
    match &z.mem.obj(v).body {
        Body::Array(a) => (index < a.len).then(|| slots::get(z, a.slots, index)),
        other => panic!("expected an Array, found {}", other.type_name()),
    }
}

pub fn set(z: &mut Context, v: Value, index: usize, value: Value) -> bool {
    let backing = match &z.mem.obj(v).body {
        Body::Array(a) => {
            if index >= a.len {
                return false;
            }
            a.slots
        }
        other => panic!("expected an Array, found {}", other.type_name()),
    };
    slots::set(z, backing, index, value);
    true
}

/// Append one element, growing the backing store when needed.
pub fn append(z: &mut Context, v: Value, value: Value) {
    let (backing, len) = match &z.mem.obj(v).body {
        Body::Array(a) => (a.slots, a.len),
        other => panic!("expected an Array, found {}", other.type_name()),
    };
    let cap = slots::length(z, backing);
    if len < cap {
        slots::set(z, backing, len, value);
        match &mut z.mem.obj_mut(v).body {
            Body::Array(a) => a.len = len + 1,
            _ => unreachable!(),
        }
        return;
    }
    // Grow: publish the array and the element across the allocation.
    z.with_locals(2, |z, loc| {
        loc.set(&mut z.locals, 0, v);
        loc.set(&mut z.locals, 1, value);
        let new_cap = (cap * 2).max(4);
        let old_backing = match &z.mem.obj(loc.get(&z.locals, 0)).body {
            Body::Array(a) => a.slots,
            _ => unreachable!(),
        };
        let grown = slots::new_from(z, new_cap, old_backing);
        let arr = loc.get(&z.locals, 0);
        let elem = loc.get(&z.locals, 1);
        match &mut z.mem.obj_mut(arr).body {
            Body::Array(a) => {
                a.slots = grown;
                a.len = len + 1;
            }
            _ => unreachable!(),
        }
        z.mem.write_barrier(arr, grown);
        slots::set(z, grown, len, elem);
    });
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Array",
    fields: &[],
    layout: TypeLayout::FixedSlots(2),
    methods: &[],
    statics: &[],
};

pub(crate) static SLOTS_TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "ArraySlots",
    fields: &[],
    layout: TypeLayout::SlotsExtended,
    methods: &[],
    statics: &[],
};
