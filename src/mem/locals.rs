//! Locals roots: blocks of value slots native code reserves on the context
//! so the collector can see (and rewrite) references it holds across
//! allocations.
//!
//! A block is reserved with `Context::locals_enter` (or the scoped
//! `Context::with_locals`), read and written through the returned
//! [`LocalsBlock`] handle, and released in reverse order of reservation.
//! Slots are zeroed (smallint 0) on reservation.

use crate::value::repr::Value;

/// The context-owned stack all locals blocks live on.
pub struct LocalsStack {
    slots: Vec<Value>,
    blocks: Vec<(usize, usize)>, // (base, len)
}

impl LocalsStack {
    pub fn new() -> LocalsStack {
        LocalsStack { slots: Vec::new(), blocks: Vec::new() }
    }

    pub(crate) fn push_block(&mut self, len: usize) -> usize {
        let base = self.slots.len();
        self.slots.resize(base + len, Value::ZERO);
        self.blocks.push((base, len));
        base
    }

    pub(crate) fn pop_block(&mut self, base: usize, len: usize) {
        let top = self.blocks.pop().expect("locals block released twice");
        debug_assert_eq!(top, (base, len), "locals blocks released out of order");
        debug_assert_eq!(self.slots.len(), base + len);
        self.slots.truncate(base);
    }

    #[inline]
    pub(crate) fn slot(&self, index: usize) -> Value {
        self.slots[index]
    }

    #[inline]
    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Value {
        &mut self.slots[index]
    }

    /// All live slots, for the collector.
    pub(crate) fn slots_mut(&mut self) -> &mut [Value] {
        &mut self.slots
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }
}

impl Default for LocalsStack {
    fn default() -> LocalsStack {
        LocalsStack::new()
    }
}

/// Handle to one reserved block of locals slots.
#[derive(Clone, Copy, Debug)]
pub struct LocalsBlock {
    pub(crate) base: usize,
    pub(crate) len: usize,
}

impl LocalsBlock {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, locals: &LocalsStack, i: usize) -> Value {
        debug_assert!(i < self.len);
        locals.slot(self.base + i)
    }

    #[inline]
    pub fn set(&self, locals: &mut LocalsStack, i: usize, v: Value) {
        debug_assert!(i < self.len);
        *locals.slot_mut(self.base + i) = v;
    }
}
