//! The `Module` type.
//!
//! A module maps names (symbols) to smallint indices into its variables
//! store; the slot at that index is the authoritative storage.  The function
//! table's slot 0 is reserved for the module initializer.  A module can have
//! one parent, or an array of them.

use crate::common::VmResult;
use crate::mem::AllocMode;
use crate::runtime::context::Context;
use crate::runtime::invoke;
use crate::value::array::{self, slots};
use crate::value::function;
use crate::value::map;
use crate::value::obj::Body;
use crate::value::repr::Value;
use crate::value::typeobj::{NativeTypeDef, TypeLayout};

#[derive(Debug)]
pub struct ModuleObj {
    /// Map of symbol -> smallint index into `variables`.
    pub name_map: Value,
    /// ArraySlots holding the variable values.
    pub variables: Value,
    /// ArraySlots of functions; slot 0 is the initializer.
    pub functions: Value,
    /// Smallint 0 (none), a Module, or an Array of Modules.
    pub parent: Value,
}

/// Create an empty module.
pub fn new(z: &mut Context) -> Value {
    z.with_locals(1, |z, loc| {
        let empty = z.globals.val_empty_slots;
        let module = z.alloc(
            AllocMode::Surv,
            Body::Module(ModuleObj {
                name_map: Value::ZERO,
                variables: empty,
                functions: empty,
                parent: Value::ZERO,
            }),
        );
        loc.set(&mut z.locals, 0, module);
        let name_map = map::new(z, 8);
        let module = loc.get(&z.locals, 0);
        match &mut z.mem.obj_mut(module).body {
            Body::Module(m) => m.name_map = name_map,
            _ => unreachable!(),
        }
        z.mem.write_barrier(module, name_map);
        module
    })
}

fn get(z: &Context, v: Value) -> &ModuleObj {
    match &z.mem.obj(v).body {
        Body::Module(m) => m,
        other => panic!("expected a Module, found {}", other.type_name()),
    }
}

pub fn is_module(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::Module(_))
}

/// The variable index a name maps to, if any.
pub fn find(z: &Context, module: Value, name_sym: Value) -> Option<usize> {
    let index = map::sym_get(z, get(z, module).name_map, name_sym)?;
    Some(index.as_smallint().expect("name map holds a non-smallint index") as usize)
}

/// Read a variable by name.
pub fn get_var(z: &Context, module: Value, name_sym: Value) -> Option<Value> {
    let index = find(z, module, name_sym)?;
    Some(slots::get(z, get(z, module).variables, index))
}

/// Write a variable by name, creating the slot on first use.
pub fn set_var(z: &mut Context, module: Value, name_sym: Value, value: Value) {
    if let Some(index) = find(z, module, name_sym) {
        let variables = get(z, module).variables;
        slots::set(z, variables, index, value);
        return;
    }
    z.with_locals(3, |z, loc| {
        loc.set(&mut z.locals, 0, module);
        loc.set(&mut z.locals, 1, name_sym);
        loc.set(&mut z.locals, 2, value);
        let index = map::length(z, get(z, module).name_map);
        let name_map = get(z, module).name_map;
        map::sym_set(z, name_map, name_sym, Value::smallint(index as i64));
        let module = loc.get(&z.locals, 0);
        let variables = get(z, module).variables;
        let cap = slots::length(z, variables);
        debug_assert!(cap >= index);
        if cap == index {
            let grown = slots::new_from(z, cap + 4, variables);
            let module = loc.get(&z.locals, 0);
            match &mut z.mem.obj_mut(module).body {
                Body::Module(m) => m.variables = grown,
                _ => unreachable!(),
            }
            z.mem.write_barrier(module, grown);
        }
        let module = loc.get(&z.locals, 0);
        let value = loc.get(&z.locals, 2);
        let variables = get(z, module).variables;
        slots::set(z, variables, index, value);
    });
}

/// Add a parent module, turning the single parent into an array on demand.
pub fn add_parent(z: &mut Context, module: Value, new_parent: Value) {
    let parent = get(z, module).parent;
    if parent == Value::ZERO {
        match &mut z.mem.obj_mut(module).body {
            Body::Module(m) => m.parent = new_parent,
            _ => unreachable!(),
        }
        z.mem.write_barrier(module, new_parent);
        return;
    }
    if array::is_array(z, parent) {
        array::append(z, parent, new_parent);
        return;
    }
    // Promote the single parent to an array, holding the module in a frame
    // temp across the allocation.
    let base = z.alloc_temp(1);
    z.stack.set_temp(base, module);
    let pair = array::new(z, &[parent, new_parent]);
    let module = z.stack.temp(base);
    match &mut z.mem.obj_mut(module).body {
        Body::Module(m) => m.parent = pair,
        _ => unreachable!(),
    }
    z.mem.write_barrier(module, pair);
    z.stack.free_temp(1);
}

/// The parent modules, in search order.
pub fn parents(z: &Context, module: Value) -> Vec<Value> {
    let parent = get(z, module).parent;
    if parent == Value::ZERO {
        return Vec::new();
    }
    if array::is_array(z, parent) {
        return (0..array::length(z, parent))
            .map(|i| array::get(z, parent, i).unwrap())
            .collect();
    }
    vec![parent]
}

/// The function at `index` of the function table, if it is one.
pub fn function(z: &Context, module: Value, index: usize) -> Option<Value> {
    let table = get(z, module).functions;
    if index >= slots::length(z, table) {
        return None;
    }
    let f = slots::get(z, table, index);
    function::is_function(z, f).then_some(f)
}

/// Install the initializer at function-table slot 0.
pub fn set_init_function(z: &mut Context, module: Value, func: Value) {
    z.with_locals(2, |z, loc| {
        loc.set(&mut z.locals, 0, module);
        loc.set(&mut z.locals, 1, func);
        let table = slots::new(z, 1);
        let func = loc.get(&z.locals, 1);
        slots::set(z, table, 0, func);
        let module = loc.get(&z.locals, 0);
        match &mut z.mem.obj_mut(module).body {
            Body::Module(m) => m.functions = table,
            _ => unreachable!(),
        }
        z.mem.write_barrier(module, table);
    });
}

/// Run the module initializer (function slot 0), passing the module, then
/// retire the slot.
pub fn do_init(z: &mut Context, module: Value) -> VmResult {
    let Some(init_fn) = function(z, module, 0) else {
        return Ok(());
    };
    z.with_locals(1, |z, loc| {
        loc.set(&mut z.locals, 0, module);
        let result = invoke::call(z, init_fn, &[module]);
        let module = loc.get(&z.locals, 0);
        let table = get(z, module).functions;
        slots::set(z, table, 0, Value::ZERO);
        result.map(|_| ())
    })
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Module",
    fields: &[],
    layout: TypeLayout::FixedSlots(4),
    methods: &[],
    statics: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::symbol;

    #[test]
    fn parents_promote_to_an_array() {
        let mut z = Context::for_tests();
        z.with_locals(3, |z, loc| {
            for i in 0..3 {
                let m = new(z);
                loc.set(&mut z.locals, i, m);
            }
            let child = loc.get(&z.locals, 0);
            assert!(parents(z, child).is_empty());
            let p1 = loc.get(&z.locals, 1);
            add_parent(z, child, p1);
            assert_eq!(parents(z, child), vec![p1]);
            let p2 = loc.get(&z.locals, 2);
            add_parent(z, child, p2);
            let child = loc.get(&z.locals, 0);
            let found = parents(z, child);
            assert_eq!(found.len(), 2);
            assert_eq!(found[0], loc.get(&z.locals, 1));
            assert_eq!(found[1], loc.get(&z.locals, 2));
        });
    }

    #[test]
    fn names_map_to_stable_slots() {
        let mut z = Context::for_tests();
        z.with_locals(2, |z, loc| {
            let module = new(z);
            loc.set(&mut z.locals, 0, module);
            let name_a = symbol::get(z, b"a");
            loc.set(&mut z.locals, 1, name_a);
            let module = loc.get(&z.locals, 0);
            set_var(z, module, name_a, Value::smallint(11));
            for i in 0..10i64 {
                let name = symbol::get(z, format!("var_{i}").as_bytes());
                let module = loc.get(&z.locals, 0);
                set_var(z, module, name, Value::smallint(i));
            }
            let module = loc.get(&z.locals, 0);
            let name_a = loc.get(&z.locals, 1);
            assert_eq!(get_var(z, module, name_a), Some(Value::smallint(11)));
            assert_eq!(find(z, module, name_a), Some(0));
            // Re-binding a name reuses its slot.
            set_var(z, module, name_a, Value::smallint(99));
            assert_eq!(find(z, module, name_a), Some(0));
            assert_eq!(get_var(z, module, name_a), Some(Value::smallint(99)));
        });
    }
}
