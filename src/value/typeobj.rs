//! The `Type` type, and the native definition tables the builtin types are
//! constructed from at context start-up.

use crate::mem::AllocMode;
use crate::runtime::context::{Context, NativeFn};
use crate::value::array::slots;
use crate::value::function;
use crate::value::map;
use crate::value::obj::Body;
use crate::value::repr::Value;
use crate::value::symbol;
use crate::value::tuple;

/// Instance layout descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeLayout {
    /// A fixed number of object slots.
    FixedSlots(u16),
    /// Fixed part extended by a byte region.
    BytesExtended,
    /// Fixed part extended by an object-slot region.
    SlotsExtended,
}

#[derive(Debug)]
pub struct TypeObj {
    /// Type name symbol.
    pub name: Value,
    /// Tuple of field-name symbols.
    pub fields: Value,
    /// Map of symbol -> smallint index into `methods`.
    pub method_map: Value,
    /// ArraySlots of method functions.
    pub methods: Value,
    /// Map of symbol -> smallint index into `statics`.
    pub static_map: Value,
    /// ArraySlots of static values.
    pub statics: Value,
    pub layout: TypeLayout,
}

/// Declarative native function description: name, `(na, no, nl)` meta, and
/// the entry point.  `nl` is the frame size excluding reg-0.
pub struct NativeFuncDef {
    pub name: &'static str,
    pub meta: (u8, i8, u16),
    pub code: NativeFn,
}

/// Declarative native type description.
pub struct NativeTypeDef {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub layout: TypeLayout,
    pub methods: &'static [NativeFuncDef],
    pub statics: &'static [NativeFuncDef],
}

/// Build a function table from a def list.  Returns (name map, slots).
fn build_func_table(z: &mut Context, defs: &'static [NativeFuncDef]) -> (Value, Value) {
    z.with_locals(2, |z, loc| {
        let m = map::new(z, defs.len());
        loc.set(&mut z.locals, 0, m);
        let table = slots::new(z, defs.len());
        loc.set(&mut z.locals, 1, table);
        for (i, def) in defs.iter().enumerate() {
            let meta = function::meta_from_def(def.meta.0, def.meta.1, def.meta.2)
                .expect("native function meta does not fit its frame");
            let f = function::new_native(z, meta, def.code);
            let table = loc.get(&z.locals, 1);
            slots::set(z, table, i, f);
            let name = symbol::get(z, def.name.as_bytes());
            let m = loc.get(&z.locals, 0);
            map::sym_set(z, m, name, Value::smallint(i as i64));
        }
        (loc.get(&z.locals, 0), loc.get(&z.locals, 1))
    })
}

/// Materialise a type object from its native definition.
pub fn from_native_def(z: &mut Context, def: &'static NativeTypeDef) -> Value {
    z.with_locals(3, |z, loc| {
        let name = symbol::get(z, def.name.as_bytes());
        let nil = z.globals.val_nil;
        let empty = z.globals.val_empty_slots;
        let t = z.alloc(
            AllocMode::Surv,
            Body::Type(TypeObj {
                name,
                fields: nil,
                method_map: Value::ZERO,
                methods: empty,
                static_map: Value::ZERO,
                statics: empty,
                layout: def.layout,
            }),
        );
        loc.set(&mut z.locals, 0, t);

        let fields = z.with_locals(def.fields.len(), |z, floc| {
            for (i, field) in def.fields.iter().enumerate() {
                let sym = symbol::get(z, field.as_bytes());
                floc.set(&mut z.locals, i, sym);
            }
            let syms: Vec<Value> = (0..def.fields.len()).map(|i| floc.get(&z.locals, i)).collect();
            tuple::new(z, &syms)
        });
        let t = loc.get(&z.locals, 0);
        match &mut z.mem.obj_mut(t).body {
            Body::Type(ty) => ty.fields = fields,
            _ => unreachable!(),
        }
        z.mem.write_barrier(t, fields);

        let (method_map, methods) = build_func_table(z, def.methods);
        let t = loc.get(&z.locals, 0);
        loc.set(&mut z.locals, 1, method_map);
        loc.set(&mut z.locals, 2, methods);
        match &mut z.mem.obj_mut(t).body {
            Body::Type(ty) => {
                ty.method_map = method_map;
                ty.methods = methods;
            }
            _ => unreachable!(),
        }
        z.mem.write_barrier(t, method_map);
        z.mem.write_barrier(t, methods);

        let (static_map, statics) = build_func_table(z, def.statics);
        let t = loc.get(&z.locals, 0);
        match &mut z.mem.obj_mut(t).body {
            Body::Type(ty) => {
                ty.static_map = static_map;
                ty.statics = statics;
            }
            _ => unreachable!(),
        }
        z.mem.write_barrier(t, static_map);
        z.mem.write_barrier(t, statics);
        loc.get(&z.locals, 0)
    })
}

fn get(z: &Context, v: Value) -> &TypeObj {
    match &z.mem.obj(v).body {
        Body::Type(t) => t,
        other => panic!("expected a Type, found {}", other.type_name()),
    }
}

pub fn is_type(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::Type(_))
}

pub fn name(z: &Context, v: Value) -> Value {
    get(z, v).name
}

pub fn layout(z: &Context, v: Value) -> TypeLayout {
    get(z, v).layout
}

/// Look up a method by name symbol.
pub fn find_method(z: &Context, type_val: Value, name_sym: Value) -> Option<Value> {
    let t = get(z, type_val);
    if t.method_map == Value::ZERO {
        return None;
    }
    let index = map::sym_get(z, t.method_map, name_sym)?;
    Some(slots::get(z, t.methods, index.as_smallint().unwrap() as usize))
}

/// Look up a static member by name symbol.
pub fn find_static(z: &Context, type_val: Value, name_sym: Value) -> Option<Value> {
    let t = get(z, type_val);
    if t.static_map == Value::ZERO {
        return None;
    }
    let index = map::sym_get(z, t.static_map, name_sym)?;
    Some(slots::get(z, t.statics, index.as_smallint().unwrap() as usize))
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Type",
    fields: &[],
    layout: TypeLayout::FixedSlots(7),
    methods: &[],
    statics: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::obj;

    #[test]
    fn builtin_types_resolve_their_methods() {
        let mut z = Context::for_tests();
        let hash_sym = z.globals.sym_hash;
        let cmp_sym = z.globals.sym_operator_cmp;
        for type_val in [z.globals.type_nil, z.globals.type_int, z.globals.type_float] {
            assert!(is_type(&z, type_val));
            assert!(find_method(&z, type_val, hash_sym).is_some());
            assert!(find_method(&z, type_val, cmp_sym).is_some());
        }
        assert!(find_method(&z, z.globals.type_tuple, hash_sym).is_none());
        let call_sym = z.globals.sym_operator_call;
        assert!(find_method(&z, z.globals.type_function, call_sym).is_some());
        // Method lookup composes with value-side dispatch.
        assert!(obj::find_method(&z, Value::smallint(1), hash_sym).is_some());
        let name_sym = name(&z, z.globals.type_string);
        assert_eq!(symbol::bytes(&z, name_sym), b"String");
    }
}
