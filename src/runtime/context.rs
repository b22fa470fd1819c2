//! The runtime context: object memory, call stack, symbol registry, global
//! table, locals roots, module loader, and the panic handler.  One context is
//! owned by one native thread; nothing here is thread-safe.

use derive_more::Display;
use log::debug;

use crate::common::{Thrown, VmResult};
use crate::mem::heap::{self, RootSet};
use crate::mem::{AllocMode, LocalsBlock, LocalsStack, ObjMem};
use crate::runtime::loader::ModuleLoader;
use crate::runtime::options::RuntimeOptions;
use crate::runtime::prelude;
use crate::runtime::stack::CallStack;
use crate::value::array::{self, SlotsObj};
use crate::value::obj::Body;
use crate::value::repr::Value;
use crate::value::string::StringObj;
use crate::value::symbol::{self, SymbolRegistry};
use crate::value::tuple::TupleObj;
use crate::value::typeobj;
use crate::value::{exception, float, function, int, map, range, stream, string, tuple};

/// Entry point of a native function.  Arguments are in the current frame's
/// registers 1..; the result (or the thrown exception) goes to reg-0.
pub type NativeFn = fn(&mut Context) -> VmResult;

/// Fatal termination reasons.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum PanicReason {
    /// Unrecoverable programmer error.
    #[display("ABORT")]
    Abort,
    /// Allocation failure after a full collection.
    #[display("OOM")]
    Oom,
    /// Stack overflow.
    #[display("SOV")]
    Sov,
    /// Illegal bytecode.
    #[display("ILL")]
    Ill,
    /// Unimplemented path.
    #[display("IMPL")]
    Impl,
}

pub type PanicHook = Box<dyn FnMut(PanicReason)>;

/// Built-in global variables: singletons, types, and well-known symbols.
/// This is a GC root.
pub struct Globals {
    pub val_nil: Value,
    pub val_true: Value,
    pub val_false: Value,
    pub val_empty_string: Value,
    pub val_empty_tuple: Value,
    pub val_empty_slots: Value,
    pub mod_prelude: Value,
    /// Array of modules the loader has imported, in load order.
    pub loaded_modules: Value,
    pub stream_stdin: Value,
    pub stream_stdout: Value,
    pub stream_stderr: Value,

    pub type_type: Value,
    pub type_nil: Value,
    pub type_bool: Value,
    pub type_int: Value,
    pub type_float: Value,
    pub type_string: Value,
    pub type_symbol: Value,
    pub type_tuple: Value,
    pub type_array: Value,
    pub type_array_slots: Value,
    pub type_map: Value,
    pub type_range: Value,
    pub type_exception: Value,
    pub type_function: Value,
    pub type_module: Value,
    pub type_stream: Value,

    pub sym_init: Value,
    pub sym_hash: Value,
    pub sym_operator_equ: Value,
    pub sym_operator_cmp: Value,
    pub sym_operator_add: Value,
    pub sym_operator_sub: Value,
    pub sym_operator_mul: Value,
    pub sym_operator_div: Value,
    pub sym_operator_get_element: Value,
    pub sym_operator_set_element: Value,
    pub sym_operator_call: Value,
}

impl Globals {
    fn zeroed() -> Globals {
        Globals {
            val_nil: Value::ZERO,
            val_true: Value::ZERO,
            val_false: Value::ZERO,
            val_empty_string: Value::ZERO,
            val_empty_tuple: Value::ZERO,
            val_empty_slots: Value::ZERO,
            mod_prelude: Value::ZERO,
            loaded_modules: Value::ZERO,
            stream_stdin: Value::ZERO,
            stream_stdout: Value::ZERO,
            stream_stderr: Value::ZERO,
            type_type: Value::ZERO,
            type_nil: Value::ZERO,
            type_bool: Value::ZERO,
            type_int: Value::ZERO,
            type_float: Value::ZERO,
            type_string: Value::ZERO,
            type_symbol: Value::ZERO,
            type_tuple: Value::ZERO,
            type_array: Value::ZERO,
            type_array_slots: Value::ZERO,
            type_map: Value::ZERO,
            type_range: Value::ZERO,
            type_exception: Value::ZERO,
            type_function: Value::ZERO,
            type_module: Value::ZERO,
            type_stream: Value::ZERO,
            sym_init: Value::ZERO,
            sym_hash: Value::ZERO,
            sym_operator_equ: Value::ZERO,
            sym_operator_cmp: Value::ZERO,
            sym_operator_add: Value::ZERO,
            sym_operator_sub: Value::ZERO,
            sym_operator_mul: Value::ZERO,
            sym_operator_div: Value::ZERO,
            sym_operator_get_element: Value::ZERO,
            sym_operator_set_element: Value::ZERO,
            sym_operator_call: Value::ZERO,
        }
    }

    /// Visit every global slot, for the collector.
    pub(crate) fn visit(&mut self, f: &mut dyn FnMut(&mut Value)) {
        let Globals {
            val_nil,
            val_true,
            val_false,
            val_empty_string,
            val_empty_tuple,
            val_empty_slots,
            mod_prelude,
            loaded_modules,
            stream_stdin,
            stream_stdout,
            stream_stderr,
            type_type,
            type_nil,
            type_bool,
            type_int,
            type_float,
            type_string,
            type_symbol,
            type_tuple,
            type_array,
            type_array_slots,
            type_map,
            type_range,
            type_exception,
            type_function,
            type_module,
            type_stream,
            sym_init,
            sym_hash,
            sym_operator_equ,
            sym_operator_cmp,
            sym_operator_add,
            sym_operator_sub,
            sym_operator_mul,
            sym_operator_div,
            sym_operator_get_element,
            sym_operator_set_element,
            sym_operator_call,
        } = self;
        for slot in [
            val_nil,
            val_true,
            val_false,
            val_empty_string,
            val_empty_tuple,
            val_empty_slots,
            mod_prelude,
            loaded_modules,
            stream_stdin,
            stream_stdout,
            stream_stderr,
            type_type,
            type_nil,
            type_bool,
            type_int,
            type_float,
            type_string,
            type_symbol,
            type_tuple,
            type_array,
            type_array_slots,
            type_map,
            type_range,
            type_exception,
            type_function,
            type_module,
            type_stream,
            sym_init,
            sym_hash,
            sym_operator_equ,
            sym_operator_cmp,
            sym_operator_add,
            sym_operator_sub,
            sym_operator_mul,
            sym_operator_div,
            sym_operator_get_element,
            sym_operator_set_element,
            sym_operator_call,
        ] {
            f(slot);
        }
    }
}

/// Process-wide runtime state.
pub struct Context {
    pub mem: ObjMem,
    pub stack: CallStack,
    pub registry: SymbolRegistry,
    pub globals: Globals,
    pub locals: LocalsStack,
    pub loader: ModuleLoader,
    panic_hook: Option<PanicHook>,
    panicking: bool,
}

impl Context {
    /// Create a context configured from the environment.
    pub fn new() -> Context {
        Context::with_options(RuntimeOptions::from_env())
    }

    pub fn with_options(options: RuntimeOptions) -> Context {
        let mut z = Context {
            mem: ObjMem::new(options.mem),
            stack: CallStack::new(options.stack_size),
            registry: SymbolRegistry::new(),
            globals: Globals::zeroed(),
            locals: LocalsStack::new(),
            loader: ModuleLoader::new(options.module_path),
            panic_hook: None,
            panicking: false,
        };
        z.stack
            .enter_frame(Value::ZERO, 1, 0)
            .expect("stack budget below one frame");
        z.bootstrap();
        debug!(target: "kura::context", "context ready: {} symbols interned", z.registry.len());
        z
    }

    /// A context with the default options, independent of the environment.
    pub fn for_tests() -> Context {
        Context::with_options(RuntimeOptions::default())
    }

    fn bootstrap(&mut self) {
        // Singletons first; nothing else can be represented without them.
        self.globals.val_nil = self.alloc(AllocMode::Surv, Body::Nil);
        self.globals.val_true = self.alloc(AllocMode::Surv, Body::Bool(true));
        self.globals.val_false = self.alloc(AllocMode::Surv, Body::Bool(false));
        self.globals.val_empty_slots =
            self.alloc(AllocMode::Surv, Body::ArraySlots(SlotsObj { slots: Vec::new() }));
        self.globals.val_empty_string = self.alloc(
            AllocMode::Surv,
            Body::String(StringObj::from_code_points(&[])),
        );
        self.globals.val_empty_tuple =
            self.alloc(AllocMode::Surv, Body::Tuple(TupleObj { elems: Vec::new().into() }));

        self.globals.sym_init = symbol::get(self, b"init");
        self.globals.sym_hash = symbol::get(self, b"hash");
        self.globals.sym_operator_equ = symbol::get(self, b"==");
        self.globals.sym_operator_cmp = symbol::get(self, b"<=>");
        self.globals.sym_operator_add = symbol::get(self, b"+");
        self.globals.sym_operator_sub = symbol::get(self, b"-");
        self.globals.sym_operator_mul = symbol::get(self, b"*");
        self.globals.sym_operator_div = symbol::get(self, b"/");
        self.globals.sym_operator_get_element = symbol::get(self, b"[]");
        self.globals.sym_operator_set_element = symbol::get(self, b"[]=");
        self.globals.sym_operator_call = symbol::get(self, b"()");

        self.globals.type_type = typeobj::from_native_def(self, &typeobj::TYPE_DEF);
        self.globals.type_nil = typeobj::from_native_def(self, &NIL_TYPE_DEF);
        self.globals.type_bool = typeobj::from_native_def(self, &BOOL_TYPE_DEF);
        self.globals.type_int = typeobj::from_native_def(self, &int::TYPE_DEF);
        self.globals.type_float = typeobj::from_native_def(self, &float::TYPE_DEF);
        self.globals.type_string = typeobj::from_native_def(self, &string::TYPE_DEF);
        self.globals.type_symbol = typeobj::from_native_def(self, &symbol::TYPE_DEF);
        self.globals.type_tuple = typeobj::from_native_def(self, &tuple::TYPE_DEF);
        self.globals.type_array = typeobj::from_native_def(self, &array::TYPE_DEF);
        self.globals.type_array_slots = typeobj::from_native_def(self, &array::SLOTS_TYPE_DEF);
        self.globals.type_map = typeobj::from_native_def(self, &map::TYPE_DEF);
        self.globals.type_range = typeobj::from_native_def(self, &range::TYPE_DEF);
        self.globals.type_exception = typeobj::from_native_def(self, &exception::TYPE_DEF);
        self.globals.type_function = typeobj::from_native_def(self, &function::TYPE_DEF);
        self.globals.type_module = typeobj::from_native_def(self, &crate::value::module::TYPE_DEF);
        self.globals.type_stream = typeobj::from_native_def(self, &stream::TYPE_DEF);

        self.globals.stream_stdin = stream::new_stdin(self);
        self.globals.stream_stdout = stream::new_stdout(self);
        self.globals.stream_stderr = stream::new_stderr(self);
        self.globals.loaded_modules = array::new(self, &[]);
        self.globals.mod_prelude = prelude::create(self);
    }

    /* ----- allocation and collection -------------------------------------- */

    /// Allocate an object.  May run a collection first; the pending body is
    /// traced as a root, but any other reference the caller holds must be
    /// published through a locals root before calling.
    pub fn alloc(&mut self, mode: AllocMode, mut body: Body) -> Value {
        match mode {
            AllocMode::Auto => {
                if self.mem.young_full() {
                    self.collect_internal(false, Some(&mut body));
                    if self.mem.old_full() {
                        self.collect_internal(true, Some(&mut body));
                        while self.mem.old_full() {
                            if !self.mem.grow_old_cap() {
                                self.panic(PanicReason::Oom);
                            }
                        }
                    }
                }
            }
            AllocMode::Surv => {
                if self.mem.old_full() {
                    self.collect_internal(true, Some(&mut body));
                    while self.mem.old_full() {
                        if !self.mem.grow_old_cap() {
                            self.panic(PanicReason::Oom);
                        }
                    }
                }
            }
            AllocMode::NoMove => {
                if self.mem.fixed_full() {
                    self.collect_internal(true, Some(&mut body));
                    while self.mem.fixed_full() {
                        if !self.mem.grow_fixed_cap() {
                            self.panic(PanicReason::Oom);
                        }
                    }
                }
            }
        }
        self.mem.alloc_raw(mode, body)
    }

    /// Explicit collection safepoint.
    pub fn collect_garbage(&mut self, full: bool) {
        self.collect_internal(full, None);
    }

    fn collect_internal(&mut self, full: bool, extra: Option<&mut Body>) {
        let roots = RootSet {
            globals: &mut self.globals,
            stack: &mut self.stack,
            locals_slots: self.locals.slots_mut(),
            registry: &mut self.registry,
            extra,
        };
        heap::collect(&mut self.mem, roots, full);
    }

    /* ----- locals roots ----------------------------------------------------- */

    /// Reserve a locals block for the duration of `f`.
    pub fn with_locals<R>(&mut self, n: usize, f: impl FnOnce(&mut Context, LocalsBlock) -> R) -> R {
        let block = self.locals_enter(n);
        let result = f(self, block);
        self.locals_leave(block);
        result
    }

    pub fn locals_enter(&mut self, n: usize) -> LocalsBlock {
        let base = self.locals.push_block(n);
        LocalsBlock { base, len: n }
    }

    pub fn locals_leave(&mut self, block: LocalsBlock) {
        self.locals.pop_block(block.base, block.len);
    }

    /* ----- registers -------------------------------------------------------- */

    #[inline]
    pub fn reg(&self, index: usize) -> Value {
        self.stack.reg(index)
    }

    #[inline]
    pub fn set_reg(&mut self, index: usize, v: Value) {
        self.stack.set_reg(index, v);
    }

    /// Load the value in reg-0 of the current frame.
    #[inline]
    pub fn reg0(&self) -> Value {
        self.stack.reg(0)
    }

    /// Store `v` to reg-0 of the current frame.
    #[inline]
    pub fn set_reg0(&mut self, v: Value) {
        self.stack.set_reg(0, v);
    }

    /// Write the exception to reg-0 and produce the thrown signal.
    #[inline]
    pub fn throw(&mut self, exc: Value) -> Thrown {
        self.set_reg0(exc);
        Thrown
    }

    pub fn nil(&self) -> Value {
        self.globals.val_nil
    }

    pub fn bool_value(&self, b: bool) -> Value {
        if b {
            self.globals.val_true
        } else {
            self.globals.val_false
        }
    }

    /* ----- panics ------------------------------------------------------------ */

    pub fn set_panic_hook(&mut self, hook: Option<PanicHook>) {
        self.panic_hook = hook;
    }

    /// Invoke the panic handler once, then terminate.
    pub fn panic(&mut self, reason: PanicReason) -> ! {
        if !self.panicking {
            self.panicking = true;
            if let Some(hook) = self.panic_hook.as_mut() {
                hook(reason);
            }
        }
        panic!("kura runtime panic: {reason}");
    }

    /// Push a frame, panicking `SOV` when the stack budget is exceeded.
    pub(crate) fn enter_frame(&mut self, func: Value, size: usize, arg_count: usize) {
        if self.stack.enter_frame(func, size, arg_count).is_err() {
            self.panic(PanicReason::Sov);
        }
    }

    pub(crate) fn alloc_temp(&mut self, n: usize) -> usize {
        match self.stack.alloc_temp(n) {
            Ok(offset) => offset,
            Err(_) => self.panic(PanicReason::Sov),
        }
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

/* ----- Nil, Bool, and Module type definitions ------------------------------- */

use crate::value::typeobj::{NativeFuncDef, NativeTypeDef, TypeLayout};

fn nil_m_operator_equ(z: &mut Context) -> VmResult {
    let result = z.reg(1) == z.reg(2);
    let val = z.bool_value(result);
    z.set_reg0(val);
    Ok(())
}

fn nil_m_operator_cmp(z: &mut Context) -> VmResult {
    if z.reg(1) != z.reg(2) {
        let (a, b) = (z.reg(1), z.reg(2));
        let exc = exception::unsupported_operation_bin(z, "<=>", a, b);
        return Err(z.throw(exc));
    }
    z.set_reg0(Value::smallint(0));
    Ok(())
}

fn nil_m_hash(z: &mut Context) -> VmResult {
    z.set_reg0(Value::smallint(-1));
    Ok(())
}

fn nil_m_to_string(z: &mut Context) -> VmResult {
    let s = string::new(z, "nil");
    z.set_reg0(s);
    Ok(())
}

static NIL_TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Nil",
    fields: &[],
    layout: TypeLayout::FixedSlots(0),
    methods: &[
        NativeFuncDef { name: "==", meta: (2, 0, 2), code: nil_m_operator_equ },
        NativeFuncDef { name: "<=>", meta: (2, 0, 2), code: nil_m_operator_cmp },
        NativeFuncDef { name: "hash", meta: (1, 0, 1), code: nil_m_hash },
        NativeFuncDef { name: "to_string", meta: (1, 1, 2), code: nil_m_to_string },
    ],
    statics: &[],
};

fn bool_m_operator_equ(z: &mut Context) -> VmResult {
    let result = z.reg(1) == z.reg(2);
    let val = z.bool_value(result);
    z.set_reg0(val);
    Ok(())
}

fn bool_m_hash(z: &mut Context) -> VmResult {
    let this = z.reg(1);
    let h = if this == z.globals.val_true { 1 } else { 0 };
    z.set_reg0(Value::smallint(h));
    Ok(())
}

fn bool_m_to_string(z: &mut Context) -> VmResult {
    let text = if z.reg(1) == z.globals.val_true { "true" } else { "false" };
    let s = string::new(z, text);
    z.set_reg0(s);
    Ok(())
}

static BOOL_TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Bool",
    fields: &[],
    layout: TypeLayout::FixedSlots(0),
    methods: &[
        NativeFuncDef { name: "==", meta: (2, 0, 2), code: bool_m_operator_equ },
        NativeFuncDef { name: "hash", meta: (1, 0, 1), code: bool_m_hash },
        NativeFuncDef { name: "to_string", meta: (1, 1, 2), code: bool_m_to_string },
    ],
    statics: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::symbol;

    #[test]
    fn bootstrap_populates_globals() {
        let z = Context::for_tests();
        assert!(z.globals.val_nil.is_object());
        assert!(z.globals.type_int.is_object());
        assert!(z.globals.mod_prelude.is_object());
        assert_eq!(symbol::bytes(&z, z.globals.sym_operator_cmp), b"<=>");
    }

    #[test]
    fn reg0_convention() {
        let mut z = Context::for_tests();
        z.set_reg0(Value::smallint(42));
        assert_eq!(z.reg0(), Value::smallint(42));
    }

    #[test]
    fn globals_survive_collections() {
        let mut z = Context::for_tests();
        let nil_before_is_nil = matches!(z.mem.obj(z.globals.val_nil).body, Body::Nil);
        assert!(nil_before_is_nil);
        z.collect_garbage(false);
        z.collect_garbage(true);
        assert!(matches!(z.mem.obj(z.globals.val_nil).body, Body::Nil));
        assert!(matches!(z.mem.obj(z.globals.val_true).body, Body::Bool(true)));
        assert_eq!(symbol::bytes(&z, z.globals.sym_hash), b"hash");
    }

    #[test]
    #[should_panic(expected = "kura runtime panic: SOV")]
    fn deep_frames_overflow() {
        let mut z = Context::for_tests();
        loop {
            z.enter_frame(Value::ZERO, 64, 0);
        }
    }
}
