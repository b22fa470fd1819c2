//! The `Map` type: a hash table keyed by object equality and hash.
//!
//! Entry hashes are computed once and stored, so a moving collection only
//! rewrites the key/value references and never rehashes.  Symbol keys have
//! allocation-free fast paths (`sym_get` / `sym_set`); the name-maps of
//! modules and types rely on them.

use crate::common::VmResult;
use crate::mem::AllocMode;
use crate::runtime::context::Context;
use crate::value::obj::{self, Body};
use crate::value::repr::Value;
use crate::value::symbol;
use crate::value::typeobj::{NativeTypeDef, TypeLayout};

#[derive(Debug)]
pub struct MapEntry {
    pub hash: u64,
    pub key: Value,
    pub value: Value,
}

#[derive(Debug)]
pub struct MapObj {
    pub buckets: Vec<Vec<MapEntry>>,
    pub len: usize,
}

impl MapObj {
    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }
}

/// Create a map with room for about `reserve` entries.
pub fn new(z: &mut Context, reserve: usize) -> Value {
    let n_buckets = (reserve.max(4)).next_power_of_two();
    let buckets = (0..n_buckets).map(|_| Vec::new()).collect();
    z.alloc(AllocMode::Auto, Body::Map(MapObj { buckets, len: 0 }))
}

pub fn is_map(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::Map(_))
}

pub fn length(z: &Context, v: Value) -> usize {
    match &z.mem.obj(v).body {
        Body::Map(m) => m.len,
        other => panic!("expected a Map, found {}", other.type_name()),
    }
}

fn get_map(z: &Context, v: Value) -> &MapObj {
    match &z.mem.obj(v).body {
        Body::Map(m) => m,
        other => panic!("expected a Map, found {}", other.type_name()),
    }
}

fn grow_if_needed(z: &mut Context, map: Value) {
    let (len, n_buckets) = {
        let m = get_map(z, map);
        (m.len, m.buckets.len())
    };
    if len + 1 <= n_buckets * 3 / 4 {
        return;
    }
    match &mut z.mem.obj_mut(map).body {
        Body::Map(m) => {
            let new_n = (n_buckets * 2) as u64;
            let old: Vec<MapEntry> = m.buckets.iter_mut().flat_map(std::mem::take).collect();
            m.buckets = (0..new_n).map(|_| Vec::new()).collect();
            for entry in old {
                let index = (entry.hash % new_n) as usize;
                m.buckets[index].push(entry);
            }
        }
        _ => unreachable!(),
    }
}

/* ----- symbol-keyed fast paths ---------------------------------------------- */

/// Look up a symbol key.  Allocation-free.
pub fn sym_get(z: &Context, map: Value, key_sym: Value) -> Option<Value> {
    let hash = symbol::hash_of(z, key_sym);
    let m = get_map(z, map);
    m.buckets[m.bucket_of(hash)]
        .iter()
        .find(|e| e.key == key_sym)
        .map(|e| e.value)
}

/// Insert or update a symbol key.  Allocation-free apart from bucket growth.
pub fn sym_set(z: &mut Context, map: Value, key_sym: Value, value: Value) {
    grow_if_needed(z, map);
    let hash = symbol::hash_of(z, key_sym);
    match &mut z.mem.obj_mut(map).body {
        Body::Map(m) => {
            let index = m.bucket_of(hash);
            if let Some(entry) = m.buckets[index].iter_mut().find(|e| e.key == key_sym) {
                entry.value = value;
            } else {
                m.buckets[index].push(MapEntry { hash, key: key_sym, value });
                m.len += 1;
            }
        }
        _ => unreachable!(),
    }
    z.mem.write_barrier(map, key_sym);
    z.mem.write_barrier(map, value);
}

/* ----- generic paths -------------------------------------------------------- */

/// Find the bucket position of `key`, with the map and key published as
/// roots: the hash and equality protocols may run arbitrary methods and
/// collect, so entries are re-read from the map on every step.  The locals
/// block must hold the map at slot 0 and the key at slot 1.
fn find_rooted(z: &mut Context, loc: crate::mem::LocalsBlock, hash: u64) -> VmResult<Option<usize>> {
    let mut i = 0usize;
    loop {
        let map = loc.get(&z.locals, 0);
        let key = loc.get(&z.locals, 1);
        let entry_key = {
            let m = get_map(z, map);
            match m.buckets[m.bucket_of(hash)].get(i) {
                None => return Ok(None),
                Some(e) => e.key,
            }
        };
        if obj::equals(z, entry_key, key)? {
            return Ok(Some(i));
        }
        i += 1;
    }
}

/// Look up a key through the object hash/equality protocol.
pub fn get(z: &mut Context, map: Value, key: Value) -> VmResult<Option<Value>> {
    if key.is_smallint() || symbol::is_symbol(z, key) {
        let hash = if key.is_smallint() { obj::hash(z, key)? } else { symbol::hash_of(z, key) };
        let m = get_map(z, map);
        return Ok(m.buckets[m.bucket_of(hash)].iter().find(|e| e.key == key).map(|e| e.value));
    }
    z.with_locals(2, |z, loc| {
        loc.set(&mut z.locals, 0, map);
        loc.set(&mut z.locals, 1, key);
        let hash = obj::hash(z, key)?;
        match find_rooted(z, loc, hash)? {
            None => Ok(None),
            Some(i) => {
                let map = loc.get(&z.locals, 0);
                let m = get_map(z, map);
                Ok(Some(m.buckets[m.bucket_of(hash)][i].value))
            }
        }
    })
}

/// Insert or update a key through the object hash/equality protocol.
pub fn set(z: &mut Context, map: Value, key: Value, value: Value) -> VmResult {
    if key.is_smallint() || symbol::is_symbol(z, key) {
        if symbol::is_symbol(z, key) {
            sym_set(z, map, key, value);
            return Ok(());
        }
        grow_if_needed(z, map);
        let hash = obj::hash(z, key)?;
        match &mut z.mem.obj_mut(map).body {
            Body::Map(m) => {
                let index = m.bucket_of(hash);
                if let Some(entry) = m.buckets[index].iter_mut().find(|e| e.key == key) {
                    entry.value = value;
                } else {
                    m.buckets[index].push(MapEntry { hash, key, value });
                    m.len += 1;
                }
            }
            _ => unreachable!(),
        }
        z.mem.write_barrier(map, value);
        return Ok(());
    }
    z.with_locals(3, |z, loc| {
        loc.set(&mut z.locals, 0, map);
        loc.set(&mut z.locals, 1, key);
        loc.set(&mut z.locals, 2, value);
        grow_if_needed(z, map);
        let hash = obj::hash(z, key)?;
        let found = find_rooted(z, loc, hash)?;
        let map = loc.get(&z.locals, 0);
        let key = loc.get(&z.locals, 1);
        let value = loc.get(&z.locals, 2);
        match &mut z.mem.obj_mut(map).body {
            Body::Map(m) => {
                let index = m.bucket_of(hash);
                match found {
                    Some(i) => m.buckets[index][i].value = value,
                    None => {
                        m.buckets[index].push(MapEntry { hash, key, value });
                        m.len += 1;
                    }
                }
            }
            _ => unreachable!(),
        }
        z.mem.write_barrier(map, key);
        z.mem.write_barrier(map, value);
        Ok(())
    })
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Map",
    fields: &[],
    layout: TypeLayout::BytesExtended,
    methods: &[],
    statics: &[],
};
