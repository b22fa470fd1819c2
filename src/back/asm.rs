//! The function bytecode assembler.
//!
//! An assembler builds one function incrementally: it interns constants and
//! symbols into per-function pools, reserves and places labels, appends
//! instructions, and patches jumps when the function is finished.  Constant
//! pools are plain data until `finish` materialises them into ArraySlots, so
//! the assembler itself holds no collectable references.
//!
//! Jump offsets are in instruction words, relative to the word after the
//! jump.  An offset that does not fit the operand's signed range, a label
//! bound twice, and other misuse are generator defects and panic `ABORT`.

use log::debug;

use crate::common::Map;
use crate::instr::{self, InstrWord, OpCode};
use crate::runtime::context::{Context, PanicReason};
use crate::value::array::slots;
use crate::value::function::{self, FuncMeta};
use crate::value::obj::Body;
use crate::value::repr::Value;
use crate::value::string;
use crate::value::symbol;
use crate::value::{float, int};

/// A pool key for one function-scope constant.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConstKey {
    Int(i64),
    /// Sign and little-endian limbs of an integer past smallint range.
    BigInt(bool, Vec<u32>),
    /// Bit pattern of the double, so `-0.0` and `NaN` dedup exactly.
    FloatBits(u64),
    Str(String),
}

/// Shapes a jump instruction can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JumpShape {
    Asw,
    AsBw { bw: u32 },
    AsBC { b: u32, c: u32 },
}

#[derive(Clone, Copy, Debug)]
struct JumpFixup {
    instr_index: usize,
    label: usize,
    opcode: OpCode,
    shape: JumpShape,
}

const LABEL_UNBOUND: i64 = -1;

pub struct Assembler {
    meta: FuncMeta,
    instrs: Vec<InstrWord>,
    constants: Vec<ConstKey>,
    constant_ids: Map<ConstKey, u32>,
    symbols: Vec<Vec<u8>>,
    symbol_ids: Map<Vec<u8>, u32>,
    labels: Vec<i64>,
    fixups: Vec<JumpFixup>,
    child_live: bool,
}

impl Assembler {
    pub fn new() -> Assembler {
        Assembler {
            meta: FuncMeta { na: 0, no: 0, nr: 1 },
            instrs: Vec::new(),
            constants: Vec::new(),
            constant_ids: Map::new(),
            symbols: Vec::new(),
            symbol_ids: Map::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            child_live: false,
        }
    }

    /// Spawn the child assembler for an inner function literal.  One parent
    /// has at most one live child; `join` gives it back.
    pub fn child(&mut self, z: &mut Context) -> Assembler {
        if self.child_live {
            self.misuse(z, "one assembler can have at most one child");
        }
        self.child_live = true;
        Assembler::new()
    }

    /// Retire a child spawned with `child`.  The child must be finished.
    pub fn join(&mut self, z: &mut Context, child: Assembler) {
        if !self.child_live || !child.is_clear() {
            self.misuse(z, "joining an unfinished child assembler");
        }
        self.child_live = false;
    }

    fn is_clear(&self) -> bool {
        self.instrs.is_empty() && self.constants.is_empty() && self.symbols.is_empty()
    }

    fn misuse(&self, z: &mut Context, message: &str) -> ! {
        log::error!(target: "kura::asm", "{message}");
        z.panic(PanicReason::Abort)
    }

    /// Get or update the function meta.
    pub fn func_meta(&mut self, meta: Option<FuncMeta>) -> FuncMeta {
        if let Some(m) = meta {
            self.meta = m;
        }
        self.meta
    }

    /// Current instruction address, in words.
    pub fn address(&self) -> usize {
        self.instrs.len()
    }

    /* ----- pools ----------------------------------------------------------- */

    /// Register or find a function-scope constant.  Returns its id.
    pub fn constant(&mut self, z: &mut Context, v: Value) -> u32 {
        let key = if let Some(i) = v.as_smallint() {
            Some(ConstKey::Int(i))
        } else {
            match &z.mem.obj(v).body {
                Body::Int(i) => Some(ConstKey::BigInt(i.neg, i.mag.clone())),
                Body::Float(f) => Some(ConstKey::FloatBits(f.to_bits())),
                Body::String(s) => Some(ConstKey::Str(s.to_utf8())),
                _ => None,
            }
        };
        match key {
            Some(key) => self.constant_key(key),
            None => self.misuse(z, "unsupported constant kind"),
        }
    }

    /// Register or find a constant by pool key.
    pub fn constant_key(&mut self, key: ConstKey) -> u32 {
        if let Some(&id) = self.constant_ids.get(&key) {
            return id;
        }
        let id = self.constants.len() as u32;
        self.constants.push(key.clone());
        self.constant_ids.insert(key, id);
        id
    }

    /// Register or find a function-scope symbol.  Returns its id.
    pub fn symbol(&mut self, z: &Context, sym: Value) -> u32 {
        self.symbol_name(symbol::bytes(z, sym))
    }

    pub fn symbol_name(&mut self, name: &[u8]) -> u32 {
        if let Some(&id) = self.symbol_ids.get(name) {
            return id;
        }
        let id = self.symbols.len() as u32;
        self.symbols.push(name.to_vec());
        self.symbol_ids.insert(name.to_vec(), id);
        id
    }

    /* ----- labels ----------------------------------------------------------- */

    /// Reserve an unbound label.
    pub fn alloc_label(&mut self) -> usize {
        self.labels.push(LABEL_UNBOUND);
        self.labels.len() - 1
    }

    /// Bind the label at the current instruction position.
    pub fn place_label(&mut self, z: &mut Context, label: usize) -> usize {
        if self.labels[label] != LABEL_UNBOUND {
            self.misuse(z, "label is already placed");
        }
        self.labels[label] = self.instrs.len() as i64;
        label
    }

    /* ----- emission ---------------------------------------------------------- */

    /// Append a pre-encoded instruction word.
    pub fn append(&mut self, word: InstrWord) {
        self.instrs.push(word);
    }

    pub fn append_aw(&mut self, op: OpCode, aw: u32) {
        self.append(instr::make_aw(op, aw));
    }

    pub fn append_asw(&mut self, op: OpCode, asw: i32) {
        self.append(instr::make_asw(op, asw));
    }

    pub fn append_abw(&mut self, op: OpCode, a: u32, bw: u32) {
        self.append(instr::make_abw(op, a, bw));
    }

    pub fn append_asbw(&mut self, op: OpCode, a: i32, bw: u32) {
        self.append(instr::make_asbw(op, a, bw));
    }

    pub fn append_absw(&mut self, op: OpCode, a: u32, bsw: i32) {
        self.append(instr::make_absw(op, a, bsw));
    }

    pub fn append_abc(&mut self, op: OpCode, a: u32, b: u32, c: u32) {
        self.append(instr::make_abc(op, a, b, c));
    }

    pub fn append_asbc(&mut self, op: OpCode, a: i32, b: u32, c: u32) {
        self.append(instr::make_asbc(op, a, b, c));
    }

    pub fn append_abscs(&mut self, op: OpCode, a: u32, bs: i32, cs: i32) {
        self.append(instr::make_abscs(op, a, bs, cs));
    }

    /// Append a jump whose 25-bit signed offset targets `label`.
    pub fn append_jump_asw(&mut self, op: OpCode, label: usize) {
        self.fixups.push(JumpFixup {
            instr_index: self.instrs.len(),
            label,
            opcode: op,
            shape: JumpShape::Asw,
        });
        self.append(instr::make_asw(op, 0));
    }

    /// Append a jump with a 9-bit signed offset and a `Bw` operand.
    pub fn append_jump_asbw(&mut self, op: OpCode, label: usize, bw: u32) {
        self.fixups.push(JumpFixup {
            instr_index: self.instrs.len(),
            label,
            opcode: op,
            shape: JumpShape::AsBw { bw },
        });
        self.append(instr::make_asbw(op, 0, bw));
    }

    /// Append a jump with a 9-bit signed offset and `B`/`C` operands.
    pub fn append_jump_asbc(&mut self, op: OpCode, label: usize, b: u32, c: u32) {
        self.fixups.push(JumpFixup {
            instr_index: self.instrs.len(),
            label,
            opcode: op,
            shape: JumpShape::AsBC { b, c },
        });
        self.append(instr::make_asbc(op, 0, b, c));
    }

    /* ----- finish ------------------------------------------------------------ */

    /// Patch the recorded jumps, freeze the pools into ArraySlots, and
    /// produce the Function object.  The assembler is cleared for reuse.
    pub fn finish(&mut self, z: &mut Context, module: Value) -> Value {
        for fixup in std::mem::take(&mut self.fixups) {
            let target = self.labels[fixup.label];
            if target == LABEL_UNBOUND {
                self.misuse(z, "jump to a label that was never placed");
            }
            let offset = target - (fixup.instr_index as i64 + 1);
            let word = match fixup.shape {
                JumpShape::Asw => {
                    if i64::from(instr::I25_MIN) > offset || offset > i64::from(instr::I25_MAX) {
                        self.misuse(z, "jump offset exceeds the I25 operand range");
                    }
                    instr::make_asw(fixup.opcode, offset as i32)
                }
                JumpShape::AsBw { bw } => {
                    if i64::from(instr::I9_MIN) > offset || offset > i64::from(instr::I9_MAX) {
                        self.misuse(z, "jump offset exceeds the I9 operand range");
                    }
                    instr::make_asbw(fixup.opcode, offset as i32, bw)
                }
                JumpShape::AsBC { b, c } => {
                    if i64::from(instr::I9_MIN) > offset || offset > i64::from(instr::I9_MAX) {
                        self.misuse(z, "jump offset exceeds the I9 operand range");
                    }
                    instr::make_asbc(fixup.opcode, offset as i32, b, c)
                }
            };
            self.instrs[fixup.instr_index] = word;
        }

        let meta = self.meta;
        let instrs = std::mem::take(&mut self.instrs);
        let constants = std::mem::take(&mut self.constants);
        let symbols = std::mem::take(&mut self.symbols);

        let func = z.with_locals(3, |z, loc| {
            loc.set(&mut z.locals, 2, module);
            let func = function::new_bytecode(z, meta, &instrs);
            loc.set(&mut z.locals, 0, func);

            // Materialise the constant pool.
            let n = constants.len();
            let const_slots = z.with_locals(n, |z, pool| {
                for (i, key) in constants.iter().enumerate() {
                    let v = match key {
                        ConstKey::Int(x) => int::new_i64(z, *x),
                        ConstKey::BigInt(neg, mag) => int::from_sign_mag(z, *neg, mag.clone()),
                        ConstKey::FloatBits(bits) => float::new(z, f64::from_bits(*bits)),
                        ConstKey::Str(text) => string::new(z, text),
                    };
                    pool.set(&mut z.locals, i, v);
                }
                let values: Vec<Value> = (0..n).map(|i| pool.get(&z.locals, i)).collect();
                slots::from_values(z, &values)
            });
            loc.set(&mut z.locals, 1, const_slots);

            // Materialise the symbol pool.
            let n = symbols.len();
            let sym_slots = z.with_locals(n, |z, pool| {
                for (i, name) in symbols.iter().enumerate() {
                    let sym = symbol::get(z, name);
                    pool.set(&mut z.locals, i, sym);
                }
                let values: Vec<Value> = (0..n).map(|i| pool.get(&z.locals, i)).collect();
                slots::from_values(z, &values)
            });

            let func = loc.get(&z.locals, 0);
            let const_slots = loc.get(&z.locals, 1);
            function::set_resources(z, func, sym_slots, const_slots);
            let module = loc.get(&z.locals, 2);
            if module.is_object() {
                function::set_module(z, func, module);
            }
            loc.get(&z.locals, 0)
        });

        debug!(
            target: "kura::asm",
            "assembled function: {} words, {} constants, {} symbols, nr={}",
            instrs.len(),
            constants.len(),
            symbols.len(),
            meta.nr
        );
        self.clear();
        func
    }

    /// Reset all assembling state.
    pub fn clear(&mut self) {
        self.meta = FuncMeta { na: 0, no: 0, nr: 1 };
        self.instrs.clear();
        self.constants.clear();
        self.constant_ids.clear();
        self.symbols.clear();
        self.symbol_ids.clear();
        self.labels.clear();
        self.fixups.clear();
    }
}

impl Default for Assembler {
    fn default() -> Assembler {
        Assembler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{extract_asw, opcode_bits};
    use crate::runtime::invoke;
    use crate::value::function::FuncMeta;

    fn nil_module() -> Value {
        Value::ZERO
    }

    #[test]
    fn forward_jump_is_patched() {
        let mut z = Context::for_tests();
        let mut asm = Assembler::new();
        asm.func_meta(Some(FuncMeta { na: 0, no: 0, nr: 2 }));
        let label = asm.alloc_label();
        asm.append_jump_asw(OpCode::Nop, label);
        asm.append_aw(OpCode::Nop, 0);
        asm.append_aw(OpCode::Nop, 0);
        asm.place_label(&mut z, label);
        asm.append_aw(OpCode::RetNil, 0);
        let func = asm.finish(&mut z, nil_module());
        let code = function::bytecode(&z, func).unwrap();
        // Offset from the word after the jump (address 1) to the label
        // (address 3).
        assert_eq!(opcode_bits(code[0]), OpCode::Nop as u8);
        assert_eq!(extract_asw(code[0]), 2);
    }

    #[test]
    fn backward_jump_has_negative_offset() {
        let mut z = Context::for_tests();
        let mut asm = Assembler::new();
        asm.func_meta(Some(FuncMeta { na: 0, no: 0, nr: 2 }));
        let label = asm.alloc_label();
        asm.place_label(&mut z, label);
        asm.append_aw(OpCode::Nop, 0);
        asm.append_jump_asbw(OpCode::Nop, label, 7);
        asm.append_aw(OpCode::RetNil, 0);
        let func = asm.finish(&mut z, nil_module());
        let code = function::bytecode(&z, func).unwrap();
        let (offset, bw) = crate::instr::extract_asbw(code[1]);
        assert_eq!(offset, -2);
        assert_eq!(bw, 7);
    }

    #[test]
    #[should_panic(expected = "kura runtime panic: ABORT")]
    fn out_of_range_jump_is_a_generator_defect() {
        let mut z = Context::for_tests();
        let mut asm = Assembler::new();
        let label = asm.alloc_label();
        asm.append_jump_asbw(OpCode::Nop, label, 0);
        for _ in 0..instr::I9_MAX as usize + 8 {
            asm.append_aw(OpCode::Nop, 0);
        }
        asm.place_label(&mut z, label);
        asm.finish(&mut z, nil_module());
    }

    #[test]
    #[should_panic(expected = "kura runtime panic: ABORT")]
    fn placing_a_label_twice_is_a_defect() {
        let mut z = Context::for_tests();
        let mut asm = Assembler::new();
        let label = asm.alloc_label();
        asm.place_label(&mut z, label);
        asm.place_label(&mut z, label);
    }

    #[test]
    fn constants_and_symbols_dedup() {
        let mut z = Context::for_tests();
        let mut asm = Assembler::new();
        let a = asm.constant_key(ConstKey::Int(42));
        let b = asm.constant_key(ConstKey::Int(42));
        let c = asm.constant_key(ConstKey::Int(43));
        assert_eq!(a, b);
        assert_ne!(a, c);
        let s1 = asm.symbol_name(b"foo");
        let s2 = asm.symbol_name(b"foo");
        let s3 = asm.symbol_name(b"bar");
        assert_eq!(s1, s2);
        assert_ne!(s1, s3);
        // Heap values dedup through their pool keys too.
        let v = crate::value::string::new(&mut z, "txt");
        let k1 = asm.constant(&mut z, v);
        let v2 = crate::value::string::new(&mut z, "txt");
        let k2 = asm.constant(&mut z, v2);
        assert_eq!(k1, k2);
    }

    #[test]
    fn finished_function_carries_its_pools() {
        let mut z = Context::for_tests();
        let mut asm = Assembler::new();
        asm.func_meta(Some(FuncMeta { na: 0, no: 0, nr: 2 }));
        let id = asm.constant_key(ConstKey::Str("hi".to_string()));
        let sym_id = asm.symbol_name(b"greet");
        asm.append_abw(OpCode::LdCon, 1, id);
        asm.append_aw(OpCode::Ret, 1);
        let func = asm.finish(&mut z, nil_module());
        assert_eq!(sym_id, 0);
        let sym = function::symbol(&z, func, 0).unwrap();
        assert_eq!(crate::value::symbol::bytes(&z, sym), b"greet");
        let ret = invoke::call(&mut z, func, &[]).unwrap();
        assert_eq!(crate::value::string::to_utf8(&z, ret), "hi");
        // The assembler is cleared and reusable.
        asm.func_meta(Some(FuncMeta { na: 0, no: 0, nr: 1 }));
        asm.append_aw(OpCode::RetNil, 0);
        let func2 = asm.finish(&mut z, nil_module());
        let code2 = function::bytecode(&z, func2).unwrap();
        assert_eq!(code2.len(), 1);
    }

    #[test]
    fn nesting_is_single_child() {
        let mut z = Context::for_tests();
        let mut parent = Assembler::new();
        let mut inner = parent.child(&mut z);
        inner.append_aw(OpCode::RetNil, 0);
        inner.func_meta(Some(FuncMeta { na: 0, no: 0, nr: 1 }));
        let _inner_fn = inner.finish(&mut z, nil_module());
        parent.join(&mut z, inner);
        let mut again = parent.child(&mut z);
        again.clear();
        parent.join(&mut z, again);
    }
}
