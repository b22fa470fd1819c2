//! The bytecode interpreter: decode, dispatch, execute, repeat.
//!
//! The loop runs one bytecode function in the current frame.  Illegal
//! opcodes and register indices panic `ILL`.  When a throw unwinds out of
//! the frame, one (function, instruction-offset) record is appended to the
//! exception's stack trace; propagation to the caller is by the ordinary
//! frame mechanism, never by non-local control transfer.

use log::trace;

use crate::common::{Thrown, VmResult};
use crate::instr::{self, OpCode};
use crate::runtime::context::{Context, PanicReason};
use crate::value::repr::Value;
use crate::value::{array, exception, float, function, map, tuple};

/// Read a register, treating an out-of-window index as illegal bytecode.
fn rd(z: &mut Context, index: usize) -> Value {
    if index >= z.stack.current_frame().size {
        z.panic(PanicReason::Ill);
    }
    z.reg(index)
}

/// Write a register, treating an out-of-window index as illegal bytecode.
fn wr(z: &mut Context, index: usize, v: Value) {
    if index >= z.stack.current_frame().size {
        z.panic(PanicReason::Ill);
    }
    z.set_reg(index, v);
}

/// Execute `func` (which must be a bytecode function) in the current frame.
pub fn run(z: &mut Context, func: Value) -> VmResult {
    // Bytecode functions live in the no-move space, so `func` and the code
    // buffer stay valid across collections inside the loop.
    let code = function::bytecode(z, func).expect("interpreter entered with a native function");
    let mut ip = 0usize;

    let result = loop {
        if ip >= code.len() {
            let nil = z.nil();
            z.set_reg0(nil);
            break Ok(());
        }
        let word = code[ip];
        let Ok(op) = OpCode::try_from(instr::opcode_bits(word)) else {
            z.panic(PanicReason::Ill);
        };
        trace!(target: "kura::interp", "{ip:04}: {op}");
        match op {
            OpCode::Nop => {}
            OpCode::Arg => {
                // Collect the actual arguments from register Aw through the
                // last actual into a tuple at Aw.
                let a = instr::extract_aw(word) as usize;
                let frame = z.stack.current_frame();
                if a == 0 || a >= frame.size {
                    z.panic(PanicReason::Ill);
                }
                let last = frame.arg_count.min(frame.size - 1);
                let rest: Vec<Value> = (a..=last).map(|i| z.reg(i)).collect();
                let packed = tuple::new(z, &rest);
                wr(z, a, packed);
                let nil = z.nil();
                for i in a + 1..=last {
                    z.set_reg(i, nil);
                }
            }
            OpCode::LdNil => {
                let (a, b) = instr::extract_abw(word);
                let nil = z.nil();
                for i in a..=a + b {
                    wr(z, i as usize, nil);
                }
            }
            OpCode::LdBln => {
                let (a, b) = instr::extract_abw(word);
                let v = z.bool_value(b != 0);
                wr(z, a as usize, v);
            }
            OpCode::LdCon => {
                let (a, b) = instr::extract_abw(word);
                let Some(v) = function::constant(z, func, b as usize) else {
                    z.panic(PanicReason::Ill);
                };
                wr(z, a as usize, v);
            }
            OpCode::LdSym => {
                let (a, b) = instr::extract_abw(word);
                let Some(v) = function::symbol(z, func, b as usize) else {
                    z.panic(PanicReason::Ill);
                };
                wr(z, a as usize, v);
            }
            OpCode::MkInt => {
                let (a, bsw) = instr::extract_absw(word);
                wr(z, a as usize, Value::smallint(bsw as i64));
            }
            OpCode::MkFlt => {
                let (a, bs, cs) = instr::extract_abscs(word);
                let v = float::new(z, bs as f64 * (cs as f64).exp2());
                wr(z, a as usize, v);
            }
            OpCode::MkTup => {
                let (a, b, c) = instr::extract_abc(word);
                let elems: Vec<Value> = (b..b + c).map(|i| rd(z, i as usize)).collect();
                let v = tuple::new(z, &elems);
                wr(z, a as usize, v);
            }
            OpCode::MkArr => {
                let (a, b, c) = instr::extract_abc(word);
                let elems: Vec<Value> = (b..b + c).map(|i| rd(z, i as usize)).collect();
                let v = array::new(z, &elems);
                wr(z, a as usize, v);
            }
            OpCode::MkMap => {
                let (a, b, c) = instr::extract_abc(word);
                let m = map::new(z, c as usize);
                wr(z, a as usize, m);
                let mut failed = false;
                for pair in 0..c {
                    let m = rd(z, a as usize);
                    let key = rd(z, (b + pair * 2) as usize);
                    let value = rd(z, (b + pair * 2 + 1) as usize);
                    if map::set(z, m, key, value).is_err() {
                        failed = true;
                        break;
                    }
                }
                if failed {
                    break Err(Thrown);
                }
            }
            OpCode::Thr => {
                let a = instr::extract_aw(word) as usize;
                let raised = rd(z, a);
                let exc = if exception::is_exception(z, raised) {
                    raised
                } else {
                    let nil = z.nil();
                    exception::new(z, nil, nil, raised)
                };
                z.set_reg0(exc);
                break Err(Thrown);
            }
            OpCode::RetNil => {
                let nil = z.nil();
                z.set_reg0(nil);
                break Ok(());
            }
            OpCode::Ret => {
                let a = instr::extract_aw(word) as usize;
                let v = rd(z, a);
                z.set_reg0(v);
                break Ok(());
            }
        }
        ip += 1;
    };

    if result.is_err() {
        // Record this frame in the trace before unwinding to the caller.
        let exc = z.reg0();
        if exception::is_exception(z, exc) {
            exception::stack_trace_append(z, exc, func, ip as u32);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{make_abc, make_abscs, make_absw, make_abw, make_aw};
    use crate::runtime::invoke;
    use crate::value::function::FuncMeta;
    use crate::value::string;

    fn bytecode_fn(z: &mut Context, meta: FuncMeta, code: &[u32]) -> Value {
        function::new_bytecode(z, meta, code)
    }

    #[test]
    fn literals_and_return() {
        let mut z = Context::for_tests();
        let code = [
            make_absw(OpCode::MkInt, 1, -1234),
            make_aw(OpCode::Ret, 1),
        ];
        let f = bytecode_fn(&mut z, FuncMeta { na: 0, no: 0, nr: 2 }, &code);
        let ret = invoke::call(&mut z, f, &[]).unwrap();
        assert_eq!(ret, Value::smallint(-1234));
    }

    #[test]
    fn nil_bool_and_float_loads() {
        let mut z = Context::for_tests();
        let code = [
            make_abw(OpCode::LdNil, 1, 1),
            make_abw(OpCode::LdBln, 1, 1),
            make_abscs(OpCode::MkFlt, 2, 3, -1),
            make_aw(OpCode::Ret, 2),
        ];
        let f = bytecode_fn(&mut z, FuncMeta { na: 0, no: 0, nr: 3 }, &code);
        let ret = invoke::call(&mut z, f, &[]).unwrap();
        assert_eq!(float::value(&z, ret), Some(1.5));
    }

    #[test]
    fn constants_and_symbols_load_by_id() {
        let mut z = Context::for_tests();
        use crate::value::array::slots;
        use crate::value::symbol;
        z.with_locals(3, |z, loc| {
            let code = [
                make_abw(OpCode::LdCon, 1, 0),
                make_aw(OpCode::Ret, 1),
            ];
            let f = bytecode_fn(z, FuncMeta { na: 0, no: 0, nr: 2 }, &code);
            loc.set(&mut z.locals, 0, f);
            let hello = string::new(z, "hello");
            loc.set(&mut z.locals, 1, hello);
            let hello = loc.get(&z.locals, 1);
            let constants = slots::from_values(z, &[hello]);
            loc.set(&mut z.locals, 2, constants);
            let sym = symbol::get(z, b"greeting");
            let symbols = slots::from_values(z, &[sym]);
            let f = loc.get(&z.locals, 0);
            let constants = loc.get(&z.locals, 2);
            function::set_resources(z, f, symbols, constants);
            let ret = invoke::call(z, f, &[]).unwrap();
            assert_eq!(string::to_utf8(z, ret), "hello");
        });
    }

    #[test]
    fn aggregates_from_register_ranges() {
        let mut z = Context::for_tests();
        let code = [
            make_absw(OpCode::MkInt, 1, 10),
            make_absw(OpCode::MkInt, 2, 20),
            make_absw(OpCode::MkInt, 3, 30),
            make_abc(OpCode::MkTup, 4, 1, 3),
            make_aw(OpCode::Ret, 4),
        ];
        let f = bytecode_fn(&mut z, FuncMeta { na: 0, no: 0, nr: 5 }, &code);
        let ret = invoke::call(&mut z, f, &[]).unwrap();
        assert!(tuple::is_tuple(&z, ret));
        assert_eq!(tuple::elements(&z, ret), vec![Value::smallint(10), Value::smallint(20), Value::smallint(30)]);

        let code = [
            make_absw(OpCode::MkInt, 1, 7),
            make_abc(OpCode::MkArr, 2, 1, 1),
            make_aw(OpCode::Ret, 2),
        ];
        let f = bytecode_fn(&mut z, FuncMeta { na: 0, no: 0, nr: 3 }, &code);
        let ret = invoke::call(&mut z, f, &[]).unwrap();
        assert!(array::is_array(&z, ret));
        assert_eq!(array::get(&z, ret, 0), Some(Value::smallint(7)));

        let code = [
            make_absw(OpCode::MkInt, 1, 1),
            make_absw(OpCode::MkInt, 2, 100),
            make_abc(OpCode::MkMap, 3, 1, 1),
            make_aw(OpCode::Ret, 3),
        ];
        let f = bytecode_fn(&mut z, FuncMeta { na: 0, no: 0, nr: 4 }, &code);
        let ret = invoke::call(&mut z, f, &[]).unwrap();
        assert!(map::is_map(&z, ret));
        assert_eq!(map::get(&mut z, ret, Value::smallint(1)).unwrap(), Some(Value::smallint(100)));
    }

    #[test]
    fn retnil_and_fallthrough_return_nil() {
        let mut z = Context::for_tests();
        let f = bytecode_fn(&mut z, FuncMeta { na: 0, no: 0, nr: 1 }, &[make_aw(OpCode::RetNil, 0)]);
        assert_eq!(invoke::call(&mut z, f, &[]).unwrap(), z.nil());
        let f = bytecode_fn(&mut z, FuncMeta { na: 0, no: 0, nr: 1 }, &[make_aw(OpCode::Nop, 0)]);
        assert_eq!(invoke::call(&mut z, f, &[]).unwrap(), z.nil());
    }

    #[test]
    fn arg_packs_trailing_actuals() {
        let mut z = Context::for_tests();
        let code = [
            make_aw(OpCode::Arg, 2),
            make_aw(OpCode::Ret, 2),
        ];
        let f = bytecode_fn(&mut z, FuncMeta { na: 3, no: 0, nr: 4 }, &code);
        let args = [Value::smallint(1), Value::smallint(2), Value::smallint(3)];
        let ret = invoke::call(&mut z, f, &args).unwrap();
        assert!(tuple::is_tuple(&z, ret));
        assert_eq!(tuple::elements(&z, ret), vec![Value::smallint(2), Value::smallint(3)]);
    }

    #[test]
    fn throw_records_the_frame_in_the_trace() {
        let mut z = Context::for_tests();
        let code = [
            make_aw(OpCode::Nop, 0),
            make_absw(OpCode::MkInt, 1, 13),
            make_aw(OpCode::Thr, 1),
        ];
        let f = bytecode_fn(&mut z, FuncMeta { na: 0, no: 0, nr: 2 }, &code);
        let err = invoke::call(&mut z, f, &[]);
        assert!(err.is_err());
        let exc = z.reg0();
        assert!(exception::is_exception(&z, exc));
        // A non-exception operand is wrapped, with the value as data.
        assert_eq!(exception::data(&z, exc), Value::smallint(13));
        assert_eq!(exception::stack_trace_length(&z, exc), 1);
        let mut seen = Vec::new();
        exception::walk_stack_trace(&mut z, exc, |_, i, func, off| {
            seen.push((i, func, off));
            false
        });
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].2, 2); // offset of the THR instruction
    }
}
