//! The object header, the body union of all built-in layouts, and the
//! generic object protocol (hash / equality / comparison / printing).

use bitflags::bitflags;

use crate::common::VmResult;
use crate::runtime::context::Context;
use crate::runtime::invoke;
use crate::value::array::{ArrayObj, SlotsObj};
use crate::value::exception::{self, ExceptionObj};
use crate::value::function::FuncObj;
use crate::value::int::{self, IntObj};
use crate::value::map::MapObj;
use crate::value::module::ModuleObj;
use crate::value::range::RangeObj;
use crate::value::repr::Value;
use crate::value::stream::StreamObj;
use crate::value::string::{self, StringObj};
use crate::value::symbol::{self, SymbolObj};
use crate::value::tuple::TupleObj;
use crate::value::typeobj::{self, TypeObj};

bitflags! {
    /// GC bookkeeping bits in the object header.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct GcFlags: u8 {
        /// Reached from a strong root during the mark phase.
        const MARK = 0b001;
        /// Queued for reference scanning during relocation (no-move space).
        const SCANNED = 0b010;
        /// Recorded in the remembered set (old object with young references).
        const REMEMBERED = 0b100;
    }
}

/// The header every heap object begins with.
#[derive(Clone, Copy, Debug)]
pub struct Header {
    pub flags: GcFlags,
    /// Number of collections survived in the young generation.
    pub age: u8,
}

impl Header {
    pub fn new() -> Header {
        Header { flags: GcFlags::empty(), age: 0 }
    }
}

impl Default for Header {
    fn default() -> Header {
        Header::new()
    }
}

/// A heap object: header plus one of the built-in layouts.
#[derive(Debug)]
pub struct Obj {
    pub header: Header,
    pub body: Body,
}

/// The built-in object layouts.  The variant is the polymorphism anchor: the
/// type object of a value is derived from it through the globals table.
#[derive(Debug)]
pub enum Body {
    Nil,
    Bool(bool),
    Int(IntObj),
    Float(f64),
    String(StringObj),
    Symbol(SymbolObj),
    Tuple(TupleObj),
    Array(ArrayObj),
    ArraySlots(SlotsObj),
    Map(MapObj),
    Range(RangeObj),
    Exception(ExceptionObj),
    Function(FuncObj),
    Module(ModuleObj),
    Type(TypeObj),
    Stream(StreamObj),
    /// Forwarding entry left in from-space during a moving collection.
    Forwarded(Value),
}

impl Body {
    /// Name of the built-in type this layout belongs to.
    pub fn type_name(&self) -> &'static str {
        match self {
            Body::Nil => "Nil",
            Body::Bool(_) => "Bool",
            Body::Int(_) => "Int",
            Body::Float(_) => "Float",
            Body::String(_) => "String",
            Body::Symbol(_) => "Symbol",
            Body::Tuple(_) => "Tuple",
            Body::Array(_) => "Array",
            Body::ArraySlots(_) => "ArraySlots",
            Body::Map(_) => "Map",
            Body::Range(_) => "Range",
            Body::Exception(_) => "Exception",
            Body::Function(_) => "Function",
            Body::Module(_) => "Module",
            Body::Type(_) => "Type",
            Body::Stream(_) => "Stream",
            Body::Forwarded(_) => "<forwarded>",
        }
    }

    /// Visit every object reference stored in this body.  `weak` selects
    /// whether weak edges (the symbol registry chain links) are included;
    /// the mark phase excludes them, reference rewriting includes them.
    pub(crate) fn visit_refs(&mut self, weak: bool, f: &mut dyn FnMut(&mut Value)) {
        match self {
            Body::Nil
            | Body::Bool(_)
            | Body::Int(_)
            | Body::Float(_)
            | Body::String(_)
            | Body::Range(_)
            | Body::Stream(_)
            | Body::Forwarded(_) => {}
            Body::Symbol(s) => {
                if weak {
                    f(&mut s.registry_next);
                }
            }
            Body::Tuple(t) => {
                for v in t.elems.iter_mut() {
                    f(v);
                }
            }
            Body::Array(a) => {
                f(&mut a.slots);
            }
            Body::ArraySlots(s) => {
                for v in s.slots.iter_mut() {
                    f(v);
                }
            }
            Body::Map(m) => {
                for bucket in m.buckets.iter_mut() {
                    for entry in bucket.iter_mut() {
                        f(&mut entry.key);
                        f(&mut entry.value);
                    }
                }
            }
            Body::Exception(e) => {
                f(&mut e.kind);
                f(&mut e.what);
                f(&mut e.data);
                f(&mut e.stack_trace);
            }
            Body::Function(fun) => {
                f(&mut fun.symbols);
                f(&mut fun.constants);
                f(&mut fun.module);
            }
            Body::Module(m) => {
                f(&mut m.name_map);
                f(&mut m.variables);
                f(&mut m.functions);
                f(&mut m.parent);
            }
            Body::Type(t) => {
                f(&mut t.name);
                f(&mut t.fields);
                f(&mut t.method_map);
                f(&mut t.methods);
                f(&mut t.static_map);
                f(&mut t.statics);
            }
        }
    }
}

/* ----- generic object protocol -------------------------------------------- */

/// The type object of a value.  Smallints report as `Int`.
pub fn type_of(z: &Context, v: Value) -> Value {
    let g = &z.globals;
    if v.is_smallint() {
        return g.type_int;
    }
    match &z.mem.obj(v).body {
        Body::Nil => g.type_nil,
        Body::Bool(_) => g.type_bool,
        Body::Int(_) => g.type_int,
        Body::Float(_) => g.type_float,
        Body::String(_) => g.type_string,
        Body::Symbol(_) => g.type_symbol,
        Body::Tuple(_) => g.type_tuple,
        Body::Array(_) => g.type_array,
        Body::ArraySlots(_) => g.type_array_slots,
        Body::Map(_) => g.type_map,
        Body::Range(_) => g.type_range,
        Body::Exception(_) => g.type_exception,
        Body::Function(_) => g.type_function,
        Body::Module(_) => g.type_module,
        Body::Type(_) => g.type_type,
        Body::Stream(_) => g.type_stream,
        Body::Forwarded(_) => unreachable!("forwarded object escaped a collection"),
    }
}

/// Display name of a value's type.
pub fn type_name(z: &Context, v: Value) -> String {
    let t = type_of(z, v);
    match &z.mem.obj(t).body {
        Body::Type(ty) => String::from_utf8_lossy(symbol::bytes(z, ty.name)).into_owned(),
        _ => "??".to_string(),
    }
}

/// Look up a method on the type of `v`.
pub fn find_method(z: &Context, v: Value, name_sym: Value) -> Option<Value> {
    let t = type_of(z, v);
    typeobj::find_method(z, t, name_sym)
}

fn is_smallint_or_symbol(z: &Context, v: Value) -> bool {
    v.is_smallint() || matches!(z.mem.obj(v).body, Body::Symbol(_))
}

/// Hash code of a value.  Smallints and symbols are hashed directly; other
/// values dispatch to their `hash` method.
pub fn hash(z: &mut Context, v: Value) -> VmResult<u64> {
    if let Some(i) = v.as_smallint() {
        return Ok(int::hash_i64(i));
    }
    if let Body::Symbol(s) = &z.mem.obj(v).body {
        return Ok(s.hash);
    }
    let sym_hash = z.globals.sym_hash;
    let ret = invoke::call_method(z, sym_hash, &[v])?;
    if let Some(h) = ret.as_smallint() {
        return Ok(h.unsigned_abs());
    }
    if ret.is_object() {
        if let Body::Int(i) = &z.mem.obj(ret).body {
            return Ok(i.hash());
        }
    }
    let exc = exception::format(z, Some("type"), Some(ret), "method `hash()' returned a non-integer value".to_string());
    Err(z.throw(exc))
}

/// Value equality.  Identity first; then the `==` method, then `<=>`, then
/// identity again for types that define neither.
pub fn equals(z: &mut Context, lhs: Value, rhs: Value) -> VmResult<bool> {
    if lhs == rhs {
        return Ok(true);
    }
    if is_smallint_or_symbol(z, lhs) && is_smallint_or_symbol(z, rhs) {
        return Ok(false);
    }
    if let Some(method) = find_method(z, lhs, z.globals.sym_operator_equ) {
        let ret = invoke::call(z, method, &[lhs, rhs])?;
        return Ok(ret == z.globals.val_true);
    }
    if let Some(method) = find_method(z, lhs, z.globals.sym_operator_cmp) {
        let ret = invoke::call(z, method, &[lhs, rhs])?;
        return Ok(ret == Value::ZERO);
    }
    Ok(false)
}

/// Value ordering through the `<=>` protocol.
pub fn compare(z: &mut Context, lhs: Value, rhs: Value) -> VmResult<std::cmp::Ordering> {
    use std::cmp::Ordering;
    if lhs == rhs {
        return Ok(Ordering::Equal);
    }
    if let (Some(a), Some(b)) = (lhs.as_smallint(), rhs.as_smallint()) {
        return Ok(a.cmp(&b));
    }
    let Some(method) = find_method(z, lhs, z.globals.sym_operator_cmp) else {
        let exc = exception::unsupported_operation_bin(z, "<=>", lhs, rhs);
        return Err(z.throw(exc));
    };
    let ret = invoke::call(z, method, &[lhs, rhs])?;
    if let Some(x) = ret.as_smallint() {
        return Ok(x.cmp(&0));
    }
    if ret.is_object() {
        if let Body::Int(i) = &z.mem.obj(ret).body {
            return Ok(if i.neg { Ordering::Less } else { Ordering::Greater });
        }
    }
    let exc = exception::format(z, Some("type"), Some(ret), "method `<=>()' returned a non-integer value".to_string());
    Err(z.throw(exc))
}

/// String representation of a value.  Dispatches to the `to_string` method;
/// types without one render as `<TypeName>`.
pub fn to_string(z: &mut Context, v: Value) -> VmResult<Value> {
    let name_sym = symbol::get(z, b"to_string");
    if let Some(method) = find_method(z, v, name_sym) {
        let ret = invoke::call(z, method, &[v])?;
        if ret.is_object() {
            if let Body::String(_) = &z.mem.obj(ret).body {
                return Ok(ret);
            }
        }
        let exc = exception::format(z, Some("type"), Some(ret), "method `to_string()' returned a non-string value".to_string());
        return Err(z.throw(exc));
    }
    let text = format!("<{}>", type_name(z, v));
    Ok(string::new(z, &text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::int;
    use crate::value::string;

    #[test]
    fn equality_dispatches_through_methods() {
        let mut z = Context::for_tests();
        z.with_locals(2, |z, loc| {
            let a = string::new(z, "same text");
            loc.set(&mut z.locals, 0, a);
            let b = string::new(z, "same text");
            loc.set(&mut z.locals, 1, b);
            let a = loc.get(&z.locals, 0);
            let b = loc.get(&z.locals, 1);
            assert_ne!(a, b);
            assert!(equals(z, a, b).unwrap());
            let c = string::new(z, "other text");
            let a = loc.get(&z.locals, 0);
            assert!(!equals(z, a, c).unwrap());
        });
    }

    #[test]
    fn smallint_and_symbol_equality_is_identity() {
        let mut z = Context::for_tests();
        assert!(equals(&mut z, Value::smallint(4), Value::smallint(4)).unwrap());
        assert!(!equals(&mut z, Value::smallint(4), Value::smallint(5)).unwrap());
        let s1 = symbol::get(&mut z, b"one_symbol");
        let s2 = symbol::get(&mut z, b"one_symbol");
        assert!(equals(&mut z, s1, s2).unwrap());
    }

    #[test]
    fn comparison_uses_the_cmp_protocol() {
        let mut z = Context::for_tests();
        use std::cmp::Ordering;
        assert_eq!(compare(&mut z, Value::smallint(1), Value::smallint(2)).unwrap(), Ordering::Less);
        let big = int::new_i128(&mut z, 1i128 << 70);
        assert_eq!(compare(&mut z, big, Value::smallint(5)).unwrap(), Ordering::Greater);
        // Values without a `<=>` method raise a type exception.
        let t = z.globals.val_empty_tuple;
        assert!(compare(&mut z, t, Value::smallint(1)).is_err());
    }

    #[test]
    fn to_string_dispatch_and_fallback() {
        let mut z = Context::for_tests();
        let nil = z.nil();
        let s = to_string(&mut z, nil).unwrap();
        assert_eq!(string::to_utf8(&z, s), "nil");
        let s = to_string(&mut z, Value::smallint(-7)).unwrap();
        assert_eq!(string::to_utf8(&z, s), "-7");
        // Types without a `to_string` method render as their type name.
        let t = z.globals.val_empty_tuple;
        let s = to_string(&mut z, t).unwrap();
        assert_eq!(string::to_utf8(&z, s), "<Tuple>");
    }

    #[test]
    fn hash_protocol() {
        let mut z = Context::for_tests();
        assert_eq!(hash(&mut z, Value::smallint(12)).unwrap(), 12);
        assert_eq!(hash(&mut z, Value::smallint(-12)).unwrap(), 12);
        let sym = symbol::get(&mut z, b"hashed");
        assert_eq!(hash(&mut z, sym).unwrap(), symbol::hash_of(&z, sym));
        // Heap values dispatch to their `hash` method.
        let s = string::new(&mut z, "h");
        assert!(hash(&mut z, s).is_ok());
    }
}
