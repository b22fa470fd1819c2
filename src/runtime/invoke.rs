//! Invocation: argument marshalling, frame setup and teardown, and the
//! native/bytecode dispatch.

use crate::common::{Thrown, VmResult};
use crate::runtime::context::Context;
use crate::runtime::interp;
use crate::value::exception;
use crate::value::function;
use crate::value::obj;
use crate::value::repr::Value;
use crate::value::tuple;

/// Verify the callable and arity, push a frame sized `nr`, and fill the
/// argument registers.  On failure the exception is written to the caller's
/// reg-0.  On success the resolved function (rooted through the new frame)
/// is returned; `execute` and `cleanup` must follow.
pub fn prepare(z: &mut Context, callable: Value, args: &[Value]) -> VmResult<Value> {
    if !function::is_function(z, callable) {
        let exc = exception::wrong_argument_type(z, "callable", callable);
        return Err(z.throw(exc));
    }
    let meta = function::meta(z, callable);
    let na = meta.na as usize;
    let argc = args.len();
    let arity_ok = if meta.no >= 0 {
        argc >= na && argc <= na + meta.no as usize
    } else {
        argc >= na
    };
    if !arity_ok {
        let exc = exception::format(
            z,
            Some("type"),
            Some(callable),
            format!("wrong number of arguments: given {argc}, expected {}", expected_arity(meta)),
        );
        return Err(z.throw(exc));
    }

    z.enter_frame(callable, meta.nr as usize, argc);
    // Raw argument copies first: once they sit in the frame they are roots,
    // and building the variadic tuple below may collect.
    let direct = if meta.no >= 0 { argc } else { argc.min(na) };
    for (i, &arg) in args.iter().take(direct).enumerate() {
        z.set_reg(1 + i, arg);
    }
    if meta.no >= 0 {
        let nil = z.nil();
        for i in argc..na + meta.no as usize {
            z.set_reg(1 + i, nil);
        }
    } else {
        let rest = tuple::new(z, &args[na..]);
        z.set_reg(1 + na, rest);
    }
    Ok(z.stack.current_frame().func)
}

fn expected_arity(meta: function::FuncMeta) -> String {
    let na = meta.na as usize;
    if meta.no < 0 {
        format!("{na}+")
    } else if meta.no > 0 {
        format!("{na}..{}", na + meta.no as usize)
    } else {
        na.to_string()
    }
}

/// Run a prepared function in the current frame.
pub fn execute(z: &mut Context, func: Value) -> VmResult {
    match function::native_code(z, func) {
        Some(code) => code(z),
        None => interp::run(z, func),
    }
}

/// Pop the frame created by `prepare` and return the callee's reg-0.
pub fn cleanup(z: &mut Context) -> Value {
    let ret = z.reg0();
    z.stack.leave_frame();
    ret
}

/// Invoke a callable with the given arguments.  On a throw, the frame is
/// unwound and the exception left in the caller's reg-0.
pub fn call(z: &mut Context, callable: Value, args: &[Value]) -> VmResult<Value> {
    let func = prepare(z, callable, args)?;
    match execute(z, func) {
        Ok(()) => Ok(cleanup(z)),
        Err(Thrown) => {
            let exc = cleanup(z);
            Err(z.throw(exc))
        }
    }
}

/// Invoke the method `name_sym` of the first argument's type.
pub fn call_method(z: &mut Context, name_sym: Value, args: &[Value]) -> VmResult<Value> {
    let recv = *args.first().expect("a method call needs a receiver");
    match obj::find_method(z, recv, name_sym) {
        Some(method) => call(z, method, args),
        None => {
            let exc = exception::name_not_found(z, "method", name_sym);
            Err(z.throw(exc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::function::FuncMeta;
    use crate::value::symbol;

    fn ret_second_arg(z: &mut Context) -> VmResult {
        let v = z.reg(2);
        z.set_reg0(v);
        Ok(())
    }

    fn exc_kind_is_type(z: &mut Context) -> bool {
        let exc = z.reg0();
        assert!(exception::is_exception(z, exc));
        let kind = exception::kind(z, exc);
        symbol::bytes(z, kind) == b"type"
    }

    #[test]
    fn exact_arity() {
        let mut z = Context::for_tests();
        let f = function::new_native(&mut z, FuncMeta { na: 2, no: 0, nr: 3 }, ret_second_arg);
        let ok = call(&mut z, f, &[Value::smallint(1), Value::smallint(2)]).unwrap();
        assert_eq!(ok, Value::smallint(2));
        assert!(call(&mut z, f, &[Value::smallint(1)]).is_err());
        assert!(exc_kind_is_type(&mut z));
        assert!(call(&mut z, f, &[Value::smallint(1), Value::smallint(2), Value::smallint(3)]).is_err());
        assert!(exc_kind_is_type(&mut z));
    }

    #[test]
    fn optional_arguments_default_to_nil() {
        let mut z = Context::for_tests();
        let f = function::new_native(&mut z, FuncMeta { na: 1, no: 1, nr: 3 }, ret_second_arg);
        let missing = call(&mut z, f, &[Value::smallint(1)]).unwrap();
        assert_eq!(missing, z.nil());
        let given = call(&mut z, f, &[Value::smallint(1), Value::smallint(9)]).unwrap();
        assert_eq!(given, Value::smallint(9));
    }

    #[test]
    fn variadic_collects_trailing_arguments() {
        let mut z = Context::for_tests();
        let f = function::new_native(&mut z, FuncMeta { na: 1, no: -1, nr: 3 }, ret_second_arg);
        let packed = call(
            &mut z,
            f,
            &[Value::smallint(1), Value::smallint(2), Value::smallint(3), Value::smallint(4)],
        )
        .unwrap();
        assert!(tuple::is_tuple(&z, packed));
        assert_eq!(tuple::length(&z, packed), 3);
        assert_eq!(tuple::get(&z, packed, 0), Some(Value::smallint(2)));
        assert_eq!(tuple::get(&z, packed, 2), Some(Value::smallint(4)));
        // No trailing actuals still yields a tuple, an empty one.
        let empty = call(&mut z, f, &[Value::smallint(1)]).unwrap();
        assert_eq!(tuple::length(&z, empty), 0);
    }

    #[test]
    fn non_callable_is_rejected() {
        let mut z = Context::for_tests();
        assert!(call(&mut z, Value::smallint(3), &[]).is_err());
        assert!(exc_kind_is_type(&mut z));
    }
}
