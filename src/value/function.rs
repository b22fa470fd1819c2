//! The `Function` type: the basic callable object.  A function carries its
//! symbol and constant tables, its parent module, the call meta, and either
//! a native entry point or a bytecode buffer.

use std::rc::Rc;

use crate::common::VmResult;
use crate::instr::InstrWord;
use crate::mem::AllocMode;
use crate::runtime::context::{Context, NativeFn};
use crate::runtime::invoke;
use crate::value::array::slots;
use crate::value::obj::Body;
use crate::value::repr::{Value, SMALLINT_MAX};
use crate::value::tuple;
use crate::value::typeobj::{NativeFuncDef, NativeTypeDef, TypeLayout};

/// Call meta of a function.
///
/// `na` is the number of mandatory arguments.  `no >= 0` is the number of
/// trailing optional parameters (missing ones default to nil); `no < 0`
/// marks a variadic function whose last declared parameter collects the
/// trailing actuals into a tuple.  `nr` is the register-window size of a
/// frame, including reg-0; the invariant `nr >= na + |no| + 1` holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FuncMeta {
    pub na: u8,
    pub no: i8,
    pub nr: u16,
}

impl FuncMeta {
    /// Parameter count as declared (mandatory plus optional/variadic).
    pub fn param_count(&self) -> usize {
        self.na as usize + self.no.unsigned_abs() as usize
    }
}

/// Convert a native definition meta `(na, no, nl)` to a function meta.
/// `nl` counts the registers of a frame excluding reg-0.  Fails when the
/// declared parameters do not fit the frame.
pub fn meta_from_def(na: u8, no: i8, nl: u16) -> Option<FuncMeta> {
    if na as u32 + no.unsigned_abs() as u32 > nl as u32 {
        return None;
    }
    let nr = nl.checked_add(1)?;
    Some(FuncMeta { na, no, nr })
}

/// The executable part of a function.
pub enum FuncCode {
    Native(NativeFn),
    Bytecode(Rc<[InstrWord]>),
}

impl std::fmt::Debug for FuncCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuncCode::Native(_) => write!(f, "Native(..)"),
            FuncCode::Bytecode(code) => write!(f, "Bytecode({} words)", code.len()),
        }
    }
}

#[derive(Debug)]
pub struct FuncObj {
    pub symbols: Value,
    pub constants: Value,
    /// Parent module, or nil for detached functions.
    pub module: Value,
    pub meta: FuncMeta,
    pub code: FuncCode,
}

/// Create a function from a native entry point.
pub fn new_native(z: &mut Context, meta: FuncMeta, code: NativeFn) -> Value {
    let empty = z.globals.val_empty_slots;
    let nil = z.globals.val_nil;
    z.alloc(
        AllocMode::Surv,
        Body::Function(FuncObj {
            symbols: empty,
            constants: empty,
            module: nil,
            meta,
            code: FuncCode::Native(code),
        }),
    )
}

/// Create a function from bytecode.  The object lives in the no-move space
/// so the interpreter's instruction pointer stays valid across collections.
pub fn new_bytecode(z: &mut Context, meta: FuncMeta, code: &[InstrWord]) -> Value {
    let empty = z.globals.val_empty_slots;
    let nil = z.globals.val_nil;
    z.alloc(
        AllocMode::NoMove,
        Body::Function(FuncObj {
            symbols: empty,
            constants: empty,
            module: nil,
            meta,
            code: FuncCode::Bytecode(code.into()),
        }),
    )
}

fn get(z: &Context, v: Value) -> &FuncObj {
    match &z.mem.obj(v).body {
        Body::Function(f) => f,
        other => panic!("expected a Function, found {}", other.type_name()),
    }
}

pub fn is_function(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::Function(_))
}

pub fn meta(z: &Context, v: Value) -> FuncMeta {
    get(z, v).meta
}

pub fn is_native(z: &Context, v: Value) -> bool {
    matches!(get(z, v).code, FuncCode::Native(_))
}

pub fn native_code(z: &Context, v: Value) -> Option<NativeFn> {
    match get(z, v).code {
        FuncCode::Native(code) => Some(code),
        FuncCode::Bytecode(_) => None,
    }
}

pub fn bytecode(z: &Context, v: Value) -> Option<Rc<[InstrWord]>> {
    match &get(z, v).code {
        FuncCode::Native(_) => None,
        FuncCode::Bytecode(code) => Some(code.clone()),
    }
}

pub fn module(z: &Context, v: Value) -> Value {
    get(z, v).module
}

/// Get a symbol from the function symbol table.
pub fn symbol(z: &Context, v: Value, id: usize) -> Option<Value> {
    let table = get(z, v).symbols;
    (id < slots::length(z, table)).then(|| slots::get(z, table, id))
}

/// Get a constant from the function constant table.
pub fn constant(z: &Context, v: Value, id: usize) -> Option<Value> {
    let table = get(z, v).constants;
    (id < slots::length(z, table)).then(|| slots::get(z, table, id))
}

/// Install the symbol and constant tables after assembly.
pub fn set_resources(z: &mut Context, v: Value, symbols: Value, constants: Value) {
    match &mut z.mem.obj_mut(v).body {
        Body::Function(f) => {
            f.symbols = symbols;
            f.constants = constants;
        }
        other => panic!("expected a Function, found {}", other.type_name()),
    }
    z.mem.write_barrier(v, symbols);
    z.mem.write_barrier(v, constants);
}

/// Set the parent module.  Shall only be used right after creation.
pub fn set_module(z: &mut Context, v: Value, module: Value) {
    match &mut z.mem.obj_mut(v).body {
        Body::Function(f) => f.module = module,
        other => panic!("expected a Function, found {}", other.type_name()),
    }
    // Modules are allocated in the old generation and never young.
    z.mem.assert_no_barrier_needed(v, module);
}

/* ----- type definition ----------------------------------------------------- */

fn m_operator_call(z: &mut Context) -> VmResult {
    let this = z.reg(1);
    let args_tuple = z.reg(2);
    let args = tuple::elements(z, args_tuple);
    let ret = invoke::call(z, this, &args)?;
    z.set_reg0(ret);
    Ok(())
}

fn m_hash(z: &mut Context) -> VmResult {
    let this = z.reg(1);
    // Native entries hash by code address; bytecode functions never move,
    // so their handle word is stable.
    let h = match &get(z, this).code {
        FuncCode::Native(code) => *code as usize as u64,
        FuncCode::Bytecode(code) => Rc::as_ptr(code) as *const u32 as usize as u64,
    };
    z.set_reg0(Value::smallint((h ^ h >> 32) as i64 & SMALLINT_MAX));
    Ok(())
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Function",
    fields: &[],
    layout: TypeLayout::BytesExtended,
    methods: &[
        NativeFuncDef { name: "()", meta: (1, -1, 2), code: m_operator_call },
        NativeFuncDef { name: "hash", meta: (1, 0, 1), code: m_hash },
    ],
    statics: &[],
};
