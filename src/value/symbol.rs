//! The `Symbol` type and the symbol registry.
//!
//! A symbol holding a specific byte sequence is unique: equal content implies
//! pointer equality.  The registry is a chained hash table whose chain links
//! live inside the symbol objects themselves.  It is a GC root, but a weak
//! one: a full collection unlinks symbols that were not marked from any other
//! root, so a dropped symbol can be reclaimed and re-created later.

use crate::common::VmResult;
use crate::mem::AllocMode;
use crate::runtime::context::Context;
use crate::value::obj::Body;
use crate::value::repr::{Value, SMALLINT_MAX};
use crate::value::string;
use crate::value::typeobj::{NativeFuncDef, NativeTypeDef, TypeLayout};

#[derive(Debug)]
pub struct SymbolObj {
    pub hash: u64,
    pub bytes: Box<[u8]>,
    /// Next symbol in the registry bucket chain; smallint 0 terminates.
    /// This is a weak edge: the mark phase does not follow it.
    pub registry_next: Value,
}

/// FNV-1a over the symbol content.  Computed once at creation and stored.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, &b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3))
}

/* ----- registry ------------------------------------------------------------ */

pub struct SymbolRegistry {
    buckets: Vec<Value>,
    len: usize,
}

impl SymbolRegistry {
    pub fn new() -> SymbolRegistry {
        SymbolRegistry { buckets: vec![Value::ZERO; 64], len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn buckets_mut(&mut self) -> &mut Vec<Value> {
        &mut self.buckets
    }

    pub(crate) fn shrink_len(&mut self, removed: usize) {
        debug_assert!(removed <= self.len);
        self.len -= removed;
    }
}

impl Default for SymbolRegistry {
    fn default() -> SymbolRegistry {
        SymbolRegistry::new()
    }
}

fn chain_find(z: &Context, mut cur: Value, hash: u64, bytes: &[u8]) -> Option<Value> {
    while cur.is_object() {
        match &z.mem.obj(cur).body {
            Body::Symbol(s) => {
                if s.hash == hash && &*s.bytes == bytes {
                    return Some(cur);
                }
                cur = s.registry_next;
            }
            other => unreachable!("non-symbol {} in the registry chain", other.type_name()),
        }
    }
    None
}

/// Retrieve the unique symbol for `bytes`, or `None` if none is registered.
pub fn find(z: &Context, bytes: &[u8]) -> Option<Value> {
    let hash = hash_bytes(bytes);
    let index = (hash % z.registry.buckets.len() as u64) as usize;
    chain_find(z, z.registry.buckets[index], hash, bytes)
}

/// Retrieve or create the unique symbol for `bytes`.
pub fn get(z: &mut Context, bytes: &[u8]) -> Value {
    let hash = hash_bytes(bytes);
    let index = (hash % z.registry.buckets.len() as u64) as usize;
    if let Some(sym) = chain_find(z, z.registry.buckets[index], hash, bytes) {
        return sym;
    }
    maybe_grow(z);
    // Allocate first; the collection this may run prunes and relocates the
    // registry, so the chain head is read only afterwards.
    let sym = z.alloc(
        AllocMode::Surv,
        Body::Symbol(SymbolObj { hash, bytes: bytes.into(), registry_next: Value::ZERO }),
    );
    let index = (hash % z.registry.buckets.len() as u64) as usize;
    let head = z.registry.buckets[index];
    match &mut z.mem.obj_mut(sym).body {
        Body::Symbol(s) => s.registry_next = head,
        _ => unreachable!(),
    }
    z.registry.buckets[index] = sym;
    z.registry.len += 1;
    sym
}

/// Retrieve or create the symbol for the concatenation of two byte chunks.
/// The lexer uses this when an identifier spans an input buffer boundary.
pub fn get2(z: &mut Context, head: &[u8], tail: &[u8]) -> Value {
    let mut bytes = Vec::with_capacity(head.len() + tail.len());
    bytes.extend_from_slice(head);
    bytes.extend_from_slice(tail);
    get(z, &bytes)
}

fn maybe_grow(z: &mut Context) {
    let old_n = z.registry.buckets.len();
    if z.registry.len + 1 <= old_n * 3 / 4 {
        return;
    }
    let new_n = old_n * 2;
    let old_buckets = std::mem::replace(&mut z.registry.buckets, vec![Value::ZERO; new_n]);
    for mut cur in old_buckets {
        while cur.is_object() {
            let (hash, next) = match &z.mem.obj(cur).body {
                Body::Symbol(s) => (s.hash, s.registry_next),
                _ => unreachable!(),
            };
            let index = (hash % new_n as u64) as usize;
            let head = z.registry.buckets[index];
            match &mut z.mem.obj_mut(cur).body {
                Body::Symbol(s) => s.registry_next = head,
                _ => unreachable!(),
            }
            z.registry.buckets[index] = cur;
            cur = next;
        }
    }
}

/* ----- accessors ----------------------------------------------------------- */

pub fn is_symbol(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::Symbol(_))
}

/// The symbol content (UTF-8, not NUL-terminated).
pub fn bytes(z: &Context, v: Value) -> &[u8] {
    match &z.mem.obj(v).body {
        Body::Symbol(s) => &s.bytes,
        other => panic!("expected a Symbol, found {}", other.type_name()),
    }
}

pub fn hash_of(z: &Context, v: Value) -> u64 {
    match &z.mem.obj(v).body {
        Body::Symbol(s) => s.hash,
        other => panic!("expected a Symbol, found {}", other.type_name()),
    }
}

/* ----- type definition ----------------------------------------------------- */

fn m_hash(z: &mut Context) -> VmResult {
    let this = z.reg(1);
    let h = hash_of(z, this) as i64 & SMALLINT_MAX;
    z.set_reg0(Value::smallint(h));
    Ok(())
}

fn m_to_string(z: &mut Context) -> VmResult {
    let this = z.reg(1);
    let text = String::from_utf8_lossy(bytes(z, this)).into_owned();
    let s = string::new(z, &text);
    z.set_reg0(s);
    Ok(())
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Symbol",
    fields: &[],
    layout: TypeLayout::BytesExtended,
    methods: &[
        NativeFuncDef { name: "hash", meta: (1, 0, 1), code: m_hash },
        NativeFuncDef { name: "to_string", meta: (1, 1, 2), code: m_to_string },
    ],
    statics: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Context;

    #[test]
    fn interning_is_unique() {
        let mut z = Context::for_tests();
        let a = get(&mut z, b"alpha");
        let b = get(&mut z, b"alpha");
        let c = get(&mut z, b"beta");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(bytes(&z, a), b"alpha");
        assert_eq!(find(&z, b"alpha"), Some(a));
        assert_eq!(find(&z, b"gamma"), None);
    }

    #[test]
    fn chunked_interning_matches_whole() {
        let mut z = Context::for_tests();
        let whole = get(&mut z, b"chunked_name");
        let joined = get2(&mut z, b"chunked_", b"name");
        assert_eq!(whole, joined);
    }

    #[test]
    fn growth_keeps_entries_findable() {
        let mut z = Context::for_tests();
        let mut syms = Vec::new();
        z.with_locals(256, |z, loc| {
            for i in 0..256usize {
                let s = get(z, format!("sym_{i}").as_bytes());
                loc.set(&mut z.locals, i, s);
                syms.push(format!("sym_{i}"));
            }
            for (i, name) in syms.iter().enumerate() {
                assert_eq!(find(z, name.as_bytes()), Some(loc.get(&z.locals, i)));
            }
        });
    }

    #[test]
    fn registry_is_weak() {
        let mut z = Context::for_tests();
        z.with_locals(1, |z, loc| {
            let kept = get(z, b"kept_symbol");
            loc.set(&mut z.locals, 0, kept);
            let _dropped = get(z, b"dropped_symbol");
            z.collect_garbage(true);
            // The unreferenced symbol is gone; the rooted one survived.
            assert_eq!(find(z, b"dropped_symbol"), None);
            let kept_now = loc.get(&z.locals, 0);
            assert_eq!(find(z, b"kept_symbol"), Some(kept_now));
            assert_eq!(bytes(z, kept_now), b"kept_symbol");
            // A later get re-creates a fresh instance.
            let again = get(z, b"dropped_symbol");
            assert_eq!(bytes(z, again), b"dropped_symbol");
        });
    }
}
