//! The `Exception` type: a kind symbol, a message, payload data, and the
//! captured stack trace.

use std::io;

use crate::common::VmResult;
use crate::mem::AllocMode;
use crate::runtime::context::Context;
use crate::value::array;
use crate::value::obj::{self, Body};
use crate::value::repr::Value;
use crate::value::string;
use crate::value::symbol;
use crate::value::typeobj::{NativeTypeDef, TypeLayout};

#[derive(Debug)]
pub struct ExceptionObj {
    /// Exception kind: a symbol (`syntax`, `type`, `key`, `value`, `io`, or
    /// user-defined) or nil.
    pub kind: Value,
    /// Message: a string or nil.
    pub what: Value,
    /// Payload: any value.
    pub data: Value,
    /// nil, or an array of alternating (Function, smallint instr-offset).
    pub stack_trace: Value,
}

/// Create an exception.  The pending body is a GC root, so the argument
/// values need no separate publication.
pub fn new(z: &mut Context, kind: Value, what: Value, data: Value) -> Value {
    let nil = z.globals.val_nil;
    z.alloc(
        AllocMode::Auto,
        Body::Exception(ExceptionObj { kind, what, data, stack_trace: nil }),
    )
}

/// Create an exception with a formatted message.
pub fn format(z: &mut Context, kind: Option<&str>, data: Option<Value>, what: String) -> Value {
    z.with_locals(2, |z, loc| {
        let nil = z.globals.val_nil;
        loc.set(&mut z.locals, 0, data.unwrap_or(nil));
        let kind_val = match kind {
            Some(name) => symbol::get(z, name.as_bytes()),
            None => z.globals.val_nil,
        };
        loc.set(&mut z.locals, 1, kind_val);
        let what_val = string::new(z, &what);
        let kind_val = loc.get(&z.locals, 1);
        let data_val = loc.get(&z.locals, 0);
        new(z, kind_val, what_val, data_val)
    })
}

pub fn is_exception(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::Exception(_))
}

pub fn kind(z: &Context, v: Value) -> Value {
    match &z.mem.obj(v).body {
        Body::Exception(e) => e.kind,
        other => panic!("expected an Exception, found {}", other.type_name()),
    }
}

pub fn what(z: &Context, v: Value) -> Value {
    match &z.mem.obj(v).body {
        Body::Exception(e) => e.what,
        other => panic!("expected an Exception, found {}", other.type_name()),
    }
}

pub fn data(z: &Context, v: Value) -> Value {
    match &z.mem.obj(v).body {
        Body::Exception(e) => e.data,
        other => panic!("expected an Exception, found {}", other.type_name()),
    }
}

/* ----- common message templates --------------------------------------------- */

pub fn unsupported_operation_un(z: &mut Context, op: &str, operand: Value) -> Value {
    let t = obj::type_name(z, operand);
    format(z, Some("type"), None, std::format!("unsupported operation: {op} {t}"))
}

pub fn unsupported_operation_bin(z: &mut Context, op: &str, lhs: Value, rhs: Value) -> Value {
    let lt = obj::type_name(z, lhs);
    let rt = obj::type_name(z, rhs);
    format(z, Some("type"), None, std::format!("unsupported operation: {lt} {op} {rt}"))
}

pub fn wrong_argument_type(z: &mut Context, arg_name: &str, v: Value) -> Value {
    let t = obj::type_name(z, v);
    format(z, Some("type"), None, std::format!("argument {arg_name} cannot be {t}"))
}

pub fn index_out_of_range(z: &mut Context, index: Value) -> Value {
    format(z, Some("key"), Some(index), "index out of range".to_string())
}

pub fn key_not_found(z: &mut Context, key: Value) -> Value {
    format(z, Some("key"), Some(key), "key not found".to_string())
}

pub fn name_not_found(z: &mut Context, what_kind: &str, name_sym: Value) -> Value {
    let name = String::from_utf8_lossy(symbol::bytes(z, name_sym)).into_owned();
    format(z, Some("key"), Some(name_sym), std::format!("no {what_kind} named {name}"))
}

/* ----- stack traces ---------------------------------------------------------- */

/// Append one (function, instruction-offset) record to the trace.
pub fn stack_trace_append(z: &mut Context, exc: Value, func: Value, instr_offset: u32) {
    z.with_locals(3, |z, loc| {
        loc.set(&mut z.locals, 0, exc);
        loc.set(&mut z.locals, 1, func);
        let trace = match &z.mem.obj(exc).body {
            Body::Exception(e) => e.stack_trace,
            other => panic!("expected an Exception, found {}", other.type_name()),
        };
        let trace = if array::is_array(z, trace) {
            trace
        } else {
            let fresh = array::new(z, &[]);
            let exc = loc.get(&z.locals, 0);
            match &mut z.mem.obj_mut(exc).body {
                Body::Exception(e) => e.stack_trace = fresh,
                _ => unreachable!(),
            }
            z.mem.write_barrier(exc, fresh);
            fresh
        };
        loc.set(&mut z.locals, 2, trace);
        let func = loc.get(&z.locals, 1);
        array::append(z, trace, func);
        let trace = loc.get(&z.locals, 2);
        array::append(z, trace, Value::smallint(instr_offset as i64));
    });
}

/// Number of trace records: half the raw array length.
pub fn stack_trace_length(z: &Context, exc: Value) -> usize {
    let trace = match &z.mem.obj(exc).body {
        Body::Exception(e) => e.stack_trace,
        other => panic!("expected an Exception, found {}", other.type_name()),
    };
    if !array::is_array(z, trace) {
        return 0;
    }
    let n = array::length(z, trace);
    debug_assert!(n % 2 == 0, "stack trace has odd raw length");
    n / 2
}

/// Visit the trace records innermost-first until the visitor returns `true`
/// or the trace ends.  Returns whether the visitor stopped the walk.
pub fn walk_stack_trace(
    z: &mut Context,
    exc: Value,
    mut visit: impl FnMut(&mut Context, usize, Value, u32) -> bool,
) -> bool {
    let n = stack_trace_length(z, exc);
    for i in 0..n {
        let trace = match &z.mem.obj(exc).body {
            Body::Exception(e) => e.stack_trace,
            _ => unreachable!(),
        };
        let func = array::get(z, trace, i * 2).unwrap();
        let offset = array::get(z, trace, i * 2 + 1).unwrap().as_smallint().unwrap() as u32;
        if visit(z, i, func, offset) {
            return true;
        }
    }
    false
}

/// Print the exception and its trace, as the host does for uncaught ones.
pub fn print(z: &mut Context, exc: Value, out: &mut dyn io::Write) -> io::Result<()> {
    write!(out, "Exception")?;
    let kind_val = kind(z, exc);
    if symbol::is_symbol(z, kind_val) {
        write!(out, " ({})", String::from_utf8_lossy(symbol::bytes(z, kind_val)))?;
    }
    let what_val = what(z, exc);
    if string::is_string(z, what_val) {
        write!(out, ": {}", string::to_utf8(z, what_val))?;
    }
    writeln!(out)?;
    if stack_trace_length(z, exc) > 0 {
        writeln!(out, "Stack trace:")?;
        let mut lines = Vec::new();
        walk_stack_trace(z, exc, |_, i, _, offset| {
            lines.push(std::format!("[{i:02}] <function> (+{offset})"));
            false
        });
        for line in lines {
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Exception",
    fields: &["type", "what", "data"],
    layout: TypeLayout::FixedSlots(4),
    methods: &[],
    statics: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Context;
    use crate::value::function;

    #[test]
    fn trace_length_and_walk_order() {
        let mut z = Context::for_tests();
        z.with_locals(2, |z, loc| {
            let exc = format(z, Some("type"), None, "boom".to_string());
            loc.set(&mut z.locals, 0, exc);
            let f = function::new_native(z, function::FuncMeta { na: 0, no: 0, nr: 1 }, |_| Ok(()));
            loc.set(&mut z.locals, 1, f);
            assert_eq!(stack_trace_length(z, exc), 0);
            for off in [3u32, 7, 11] {
                let exc = loc.get(&z.locals, 0);
                let f = loc.get(&z.locals, 1);
                stack_trace_append(z, exc, f, off);
            }
            let exc = loc.get(&z.locals, 0);
            assert_eq!(stack_trace_length(z, exc), 3);
            let mut seen = Vec::new();
            let stopped = walk_stack_trace(z, exc, |_, i, _, off| {
                seen.push((i, off));
                false
            });
            assert!(!stopped);
            assert_eq!(seen, vec![(0, 3), (1, 7), (2, 11)]);
            // The visitor can stop the walk early.
            let stopped = walk_stack_trace(z, exc, |_, i, _, _| i == 1);
            assert!(stopped);
        });
    }

    #[test]
    fn common_templates() {
        let mut z = Context::for_tests();
        // Each message is read back before the next allocation.
        let message = |z: &mut Context, exc: Value| crate::value::string::to_utf8(z, what(z, exc));

        let nil = z.globals.val_nil;
        let exc = unsupported_operation_un(&mut z, "-", nil);
        assert_eq!(message(&mut z, exc), "unsupported operation: - Nil");

        let yes = z.globals.val_true;
        let exc = unsupported_operation_bin(&mut z, "+", yes, Value::smallint(1));
        assert_eq!(message(&mut z, exc), "unsupported operation: Bool + Int");

        let no = z.globals.val_false;
        let exc = wrong_argument_type(&mut z, "count", no);
        assert_eq!(message(&mut z, exc), "argument count cannot be Bool");

        let exc = index_out_of_range(&mut z, Value::smallint(99));
        assert_eq!(message(&mut z, exc), "index out of range");
        let exc = key_not_found(&mut z, Value::smallint(7));
        assert_eq!(message(&mut z, exc), "key not found");

        let name = crate::value::symbol::get(&mut z, b"missing_var");
        let exc = name_not_found(&mut z, "variable", name);
        assert_eq!(message(&mut z, exc), "no variable named missing_var");
    }

    #[test]
    fn formatted_fields() {
        let mut z = Context::for_tests();
        let exc = format(&mut z, Some("key"), Some(Value::smallint(5)), "key not found".to_string());
        assert!(is_exception(&z, exc));
        assert_eq!(data(&z, exc), Value::smallint(5));
        let what_val = what(&z, exc);
        assert_eq!(crate::value::string::to_utf8(&z, what_val), "key not found");
        let kind_val = kind(&z, exc);
        assert_eq!(symbol::bytes(&z, kind_val), b"key");
    }
}
