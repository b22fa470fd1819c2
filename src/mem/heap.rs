//! Heap spaces and the moving generational collector.
//!
//! Three spaces: the young generation (bump-allocated, evacuated by minor
//! cycles), the old generation (receives survivors, compacted by full
//! cycles), and the fixed space (never moves; bytecode buffers, streams, and
//! other address-stable objects live here and are swept by full cycles).
//!
//! Object references are (space, index) handles; a moving cycle rewrites
//! every root slot and interior reference.  The remembered set tracks old
//! objects that may hold young references; the write barrier feeds it.

use log::debug;

use crate::runtime::context::Globals;
use crate::runtime::stack::CallStack;
use crate::value::obj::{Body, GcFlags, Header, Obj};
use crate::value::repr::{Space, Value};
use crate::value::symbol::SymbolRegistry;

/// Allocation placement request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocMode {
    /// Young-generation bump allocation.
    Auto,
    /// Allocate directly in the old generation, for objects known to outlive
    /// a nursery cycle.
    Surv,
    /// Allocate in the space that never moves, for objects whose addresses
    /// are cached (bytecode buffers, streams).
    NoMove,
}

/// Space budgets, in object slots.
#[derive(Clone, Copy, Debug)]
pub struct MemConfig {
    pub young_cap: usize,
    pub old_cap_new: usize,
    pub old_cap_max: usize,
    pub fixed_cap_new: usize,
    pub fixed_cap_max: usize,
}

impl Default for MemConfig {
    fn default() -> MemConfig {
        MemConfig {
            young_cap: 4096,
            old_cap_new: 8192,
            old_cap_max: 1 << 20,
            fixed_cap_new: 1024,
            fixed_cap_max: 1 << 16,
        }
    }
}

/// Survivors this old are promoted out of the young generation.
const PROMOTE_AGE: u8 = 2;

/// The heap.
pub struct ObjMem {
    young: Vec<Obj>,
    old: Vec<Obj>,
    fixed: Vec<Option<Obj>>,
    fixed_free: Vec<u32>,
    remembered: Vec<Value>,
    config: MemConfig,
    old_cap: usize,
    fixed_cap: usize,
    minor_cycles: u64,
    full_cycles: u64,
}

impl ObjMem {
    pub fn new(config: MemConfig) -> ObjMem {
        ObjMem {
            young: Vec::with_capacity(config.young_cap.min(4096)),
            old: Vec::new(),
            fixed: Vec::new(),
            fixed_free: Vec::new(),
            remembered: Vec::new(),
            old_cap: config.old_cap_new,
            fixed_cap: config.fixed_cap_new,
            config,
            minor_cycles: 0,
            full_cycles: 0,
        }
    }

    /// Borrow the object a reference points at.  Panics on smallints.
    #[inline]
    pub fn obj(&self, v: Value) -> &Obj {
        let (space, index) = v.as_object().expect("dereferenced a smallint");
        match space {
            Space::Young => &self.young[index as usize],
            Space::Old => &self.old[index as usize],
            Space::Fixed => self.fixed[index as usize].as_ref().expect("dangling fixed-space reference"),
        }
    }

    #[inline]
    pub fn obj_mut(&mut self, v: Value) -> &mut Obj {
        let (space, index) = v.as_object().expect("dereferenced a smallint");
        match space {
            Space::Young => &mut self.young[index as usize],
            Space::Old => &mut self.old[index as usize],
            Space::Fixed => self.fixed[index as usize].as_mut().expect("dangling fixed-space reference"),
        }
    }

    /// Place a body in a space without any collection decision; the context's
    /// `alloc` is the public entry that may collect first.
    pub(crate) fn alloc_raw(&mut self, mode: AllocMode, body: Body) -> Value {
        let obj = Obj { header: Header::new(), body };
        match mode {
            AllocMode::Auto => {
                self.young.push(obj);
                Value::object(Space::Young, (self.young.len() - 1) as u32)
            }
            AllocMode::Surv => {
                self.old.push(obj);
                Value::object(Space::Old, (self.old.len() - 1) as u32)
            }
            AllocMode::NoMove => {
                if let Some(index) = self.fixed_free.pop() {
                    self.fixed[index as usize] = Some(obj);
                    Value::object(Space::Fixed, index)
                } else {
                    self.fixed.push(Some(obj));
                    Value::object(Space::Fixed, (self.fixed.len() - 1) as u32)
                }
            }
        }
    }

    pub fn young_full(&self) -> bool {
        self.young.len() >= self.config.young_cap
    }

    pub fn old_full(&self) -> bool {
        self.old.len() >= self.old_cap
    }

    pub fn old_at_hard_limit(&self) -> bool {
        self.old.len() >= self.config.old_cap_max
    }

    pub fn fixed_full(&self) -> bool {
        self.fixed.len() - self.fixed_free.len() >= self.fixed_cap
    }

    pub fn fixed_at_hard_limit(&self) -> bool {
        self.fixed.len() - self.fixed_free.len() >= self.config.fixed_cap_max
    }

    /// Raise the soft old-space budget after a full cycle left it full.
    /// Returns false when the hard limit is already reached.
    pub(crate) fn grow_old_cap(&mut self) -> bool {
        if self.old_cap >= self.config.old_cap_max {
            return false;
        }
        self.old_cap = (self.old_cap * 2).min(self.config.old_cap_max);
        true
    }

    pub(crate) fn grow_fixed_cap(&mut self) -> bool {
        if self.fixed_cap >= self.config.fixed_cap_max {
            return false;
        }
        self.fixed_cap = (self.fixed_cap * 2).min(self.config.fixed_cap_max);
        true
    }

    /// Record `parent` in the remembered set if it is an old-generation
    /// object that was just made to reference the young object `child`.
    /// Must be invoked after every store of one heap object into another,
    /// unless `assert_no_barrier_needed` holds.
    pub fn write_barrier(&mut self, parent: Value, child: Value) {
        let (Some(ps), Some(cs)) = (parent.space(), child.space()) else {
            return;
        };
        if ps != Space::Young && cs == Space::Young {
            let header = &mut self.obj_mut(parent).header;
            if !header.flags.contains(GcFlags::REMEMBERED) {
                header.flags.insert(GcFlags::REMEMBERED);
                self.remembered.push(parent);
            }
        }
    }

    /// Debug-assert that a `parent -> child` store needs no barrier (the
    /// parent is young, or the child does not move).  Mis-stating this is a
    /// fatal defect; the assertion is the net that catches it.
    pub fn assert_no_barrier_needed(&self, parent: Value, child: Value) {
        if cfg!(debug_assertions) {
            if let (Some(ps), Some(cs)) = (parent.space(), child.space()) {
                debug_assert!(
                    ps == Space::Young || cs != Space::Young,
                    "old-to-young store without a write barrier"
                );
            }
        }
    }

    pub fn minor_cycles(&self) -> u64 {
        self.minor_cycles
    }

    pub fn full_cycles(&self) -> u64 {
        self.full_cycles
    }

    pub fn young_len(&self) -> usize {
        self.young.len()
    }

    pub fn old_len(&self) -> usize {
        self.old.len()
    }
}

/* ----- collection --------------------------------------------------------- */

/// The root slots a collection traverses and rewrites.
pub struct RootSet<'a> {
    pub globals: &'a mut Globals,
    pub stack: &'a mut CallStack,
    pub locals_slots: &'a mut [Value],
    pub registry: &'a mut SymbolRegistry,
    /// The body of the allocation being serviced, if any.  Its references
    /// are roots like any other.
    pub extra: Option<&'a mut Body>,
}

/// Run a collection cycle.
pub fn collect(mem: &mut ObjMem, mut roots: RootSet<'_>, full: bool) {
    if full {
        collect_full(mem, &mut roots);
        mem.full_cycles += 1;
    } else {
        collect_minor(mem, &mut roots);
        mem.minor_cycles += 1;
    }
    debug!(
        target: "kura::gc",
        "{} cycle done: young={} old={} fixed={}",
        if full { "full" } else { "minor" },
        mem.young.len(),
        mem.old.len(),
        mem.fixed.len() - mem.fixed_free.len(),
    );
}

/// Copy one young object out of from-space (or follow its forwarding entry)
/// and rewrite `slot`.  Returns the new reference if a copy happened.
fn evacuate_young(mem: &mut ObjMem, from: &mut [Obj], slot: &mut Value, promote_all: bool) -> Option<Value> {
    let (space, index) = slot.as_object()?;
    if space != Space::Young {
        return None;
    }
    let from_obj = &mut from[index as usize];
    if let Body::Forwarded(to) = from_obj.body {
        *slot = to;
        return None;
    }
    let mut header = from_obj.header;
    header.flags = GcFlags::empty();
    header.age = header.age.saturating_add(1);
    let body = std::mem::replace(&mut from_obj.body, Body::Forwarded(Value::ZERO));
    let to = if promote_all || header.age >= PROMOTE_AGE {
        mem.old.push(Obj { header, body });
        Value::object(Space::Old, (mem.old.len() - 1) as u32)
    } else {
        mem.young.push(Obj { header, body });
        Value::object(Space::Young, (mem.young.len() - 1) as u32)
    };
    from_obj.body = Body::Forwarded(to);
    *slot = to;
    Some(to)
}

fn collect_minor(mem: &mut ObjMem, roots: &mut RootSet<'_>) {
    let mut from = std::mem::take(&mut mem.young);
    let mut work: Vec<Value> = Vec::new();

    {
        let mut reloc = |mem: &mut ObjMem, slot: &mut Value| {
            if let Some(copied) = evacuate_young(mem, &mut from, slot, false) {
                work.push(copied);
            }
        };
        roots.globals.visit(&mut |slot| reloc(mem, slot));
        roots.stack.visit_roots(&mut |slot| reloc(mem, slot));
        for slot in roots.locals_slots.iter_mut() {
            reloc(mem, slot);
        }
        if let Some(extra) = roots.extra.as_deref_mut() {
            extra.visit_refs(true, &mut |slot| reloc(mem, slot));
        }
        // Old objects recorded by the write barrier are scanned as roots;
        // they stay remembered only while they still hold young references.
        let remembered = std::mem::take(&mut mem.remembered);
        for parent in remembered {
            let mut body = std::mem::replace(&mut mem.obj_mut(parent).body, Body::Nil);
            let mut still_young = false;
            body.visit_refs(true, &mut |slot| {
                reloc(mem, slot);
                if slot.space() == Some(Space::Young) {
                    still_young = true;
                }
            });
            mem.obj_mut(parent).body = body;
            let header = &mut mem.obj_mut(parent).header;
            if still_young {
                header.flags.insert(GcFlags::REMEMBERED);
                mem.remembered.push(parent);
            } else {
                header.flags.remove(GcFlags::REMEMBERED);
            }
        }
        // Trace everything reachable from the copied survivors.
        while let Some(v) = work.pop() {
            let mut body = std::mem::replace(&mut mem.obj_mut(v).body, Body::Nil);
            let mut has_young = false;
            body.visit_refs(true, &mut |slot| {
                if let Some(copied) = evacuate_young(mem, &mut from, slot, false) {
                    work.push(copied);
                }
                if slot.space() == Some(Space::Young) {
                    has_young = true;
                }
            });
            mem.obj_mut(v).body = body;
            if has_young && v.space() != Some(Space::Young) {
                let header = &mut mem.obj_mut(v).header;
                if !header.flags.contains(GcFlags::REMEMBERED) {
                    header.flags.insert(GcFlags::REMEMBERED);
                    mem.remembered.push(v);
                }
            }
        }
    }
    drop(from);
}

fn collect_full(mem: &mut ObjMem, roots: &mut RootSet<'_>) {
    // Phase 1: mark everything strongly reachable.  Registry chain links are
    // weak edges and are not followed.
    let mut work: Vec<Value> = Vec::new();
    let push_root = |work: &mut Vec<Value>, v: Value| {
        if v.is_object() {
            work.push(v);
        }
    };
    roots.globals.visit(&mut |slot| push_root(&mut work, *slot));
    roots.stack.visit_roots(&mut |slot| push_root(&mut work, *slot));
    for slot in roots.locals_slots.iter() {
        push_root(&mut work, *slot);
    }
    if let Some(extra) = roots.extra.as_deref_mut() {
        extra.visit_refs(false, &mut |slot| push_root(&mut work, *slot));
    }
    let mut children: Vec<Value> = Vec::new();
    while let Some(v) = work.pop() {
        let obj = mem.obj_mut(v);
        if obj.header.flags.contains(GcFlags::MARK) {
            continue;
        }
        obj.header.flags.insert(GcFlags::MARK);
        children.clear();
        obj.body.visit_refs(false, &mut |slot| {
            if slot.is_object() {
                children.push(*slot);
            }
        });
        work.extend_from_slice(&children);
    }

    // Phase 2: unlink dead symbols from the registry chains.
    prune_registry(mem, roots.registry);

    // Phase 3: relocate.  Everything reached from here on is live: young
    // survivors promote to the (fresh) old space, old survivors compact into
    // it, fixed objects stay put and are queued for reference scanning.
    let mut from_young = std::mem::take(&mut mem.young);
    let mut from_old = std::mem::take(&mut mem.old);
    mem.remembered.clear();

    let mut work: Vec<Value> = Vec::new();
    let reloc = |mem: &mut ObjMem,
                 from_young: &mut [Obj],
                 from_old: &mut [Obj],
                 work: &mut Vec<Value>,
                 slot: &mut Value| {
        let Some((space, index)) = slot.as_object() else {
            return;
        };
        match space {
            Space::Young => {
                let from_obj = &mut from_young[index as usize];
                if let Body::Forwarded(to) = from_obj.body {
                    *slot = to;
                    return;
                }
                let body = std::mem::replace(&mut from_obj.body, Body::Forwarded(Value::ZERO));
                mem.old.push(Obj { header: Header::new(), body });
                let to = Value::object(Space::Old, (mem.old.len() - 1) as u32);
                from_obj.body = Body::Forwarded(to);
                *slot = to;
                work.push(to);
            }
            Space::Old => {
                let from_obj = &mut from_old[index as usize];
                if let Body::Forwarded(to) = from_obj.body {
                    *slot = to;
                    return;
                }
                let body = std::mem::replace(&mut from_obj.body, Body::Forwarded(Value::ZERO));
                mem.old.push(Obj { header: Header::new(), body });
                let to = Value::object(Space::Old, (mem.old.len() - 1) as u32);
                from_obj.body = Body::Forwarded(to);
                *slot = to;
                work.push(to);
            }
            Space::Fixed => {
                let obj = mem.fixed[index as usize].as_mut().expect("dangling fixed-space reference");
                if !obj.header.flags.contains(GcFlags::SCANNED) {
                    obj.header.flags.insert(GcFlags::SCANNED);
                    work.push(*slot);
                }
            }
        }
    };

    roots.globals.visit(&mut |slot| reloc(mem, &mut from_young, &mut from_old, &mut work, slot));
    roots.stack.visit_roots(&mut |slot| reloc(mem, &mut from_young, &mut from_old, &mut work, slot));
    for slot in roots.locals_slots.iter_mut() {
        reloc(mem, &mut from_young, &mut from_old, &mut work, slot);
    }
    if let Some(extra) = roots.extra.as_deref_mut() {
        extra.visit_refs(true, &mut |slot| reloc(mem, &mut from_young, &mut from_old, &mut work, slot));
    }
    for slot in roots.registry.buckets_mut().iter_mut() {
        reloc(mem, &mut from_young, &mut from_old, &mut work, slot);
    }
    while let Some(v) = work.pop() {
        let mut body = std::mem::replace(&mut mem.obj_mut(v).body, Body::Nil);
        body.visit_refs(true, &mut |slot| {
            reloc(mem, &mut from_young, &mut from_old, &mut work, slot)
        });
        mem.obj_mut(v).body = body;
    }

    // Phase 4: sweep the fixed space and clear the bookkeeping bits.
    for (index, entry) in mem.fixed.iter_mut().enumerate() {
        if let Some(obj) = entry {
            if obj.header.flags.contains(GcFlags::SCANNED) {
                obj.header.flags.remove(GcFlags::SCANNED | GcFlags::MARK | GcFlags::REMEMBERED);
            } else {
                *entry = None;
                mem.fixed_free.push(index as u32);
            }
        }
    }
    drop(from_young);
    drop(from_old);
}

/// Unlink registry entries whose symbol was not marked from any strong root.
fn prune_registry(mem: &mut ObjMem, registry: &mut SymbolRegistry) {
    let mut removed = 0usize;
    for bucket in registry.buckets_mut().iter_mut() {
        // Rebuild the chain keeping only marked symbols.
        let mut cur = *bucket;
        *bucket = Value::ZERO;
        let mut tail: Option<Value> = None;
        while cur.is_object() {
            let (marked, next) = match &mem.obj(cur).body {
                Body::Symbol(s) => (mem.obj(cur).header.flags.contains(GcFlags::MARK), s.registry_next),
                other => unreachable!("non-symbol {} in the registry chain", other.type_name()),
            };
            if marked {
                match tail {
                    None => *bucket = cur,
                    Some(prev) => match &mut mem.obj_mut(prev).body {
                        Body::Symbol(s) => s.registry_next = cur,
                        _ => unreachable!(),
                    },
                }
                if let Body::Symbol(s) = &mut mem.obj_mut(cur).body {
                    s.registry_next = Value::ZERO;
                }
                tail = Some(cur);
            } else {
                removed += 1;
            }
            cur = next;
        }
    }
    registry.shrink_len(removed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Context;
    use crate::value::array::{self, slots};
    use crate::value::string;

    #[test]
    fn locals_roots_survive_collections() {
        let mut z = Context::for_tests();
        z.with_locals(2, |z, loc| {
            let s = string::new(z, "survivor");
            loc.set(&mut z.locals, 0, s);
            let arr = array::new(z, &[Value::smallint(1), Value::smallint(2)]);
            loc.set(&mut z.locals, 1, arr);
            z.collect_garbage(false);
            z.collect_garbage(true);
            z.collect_garbage(false);
            let s = loc.get(&z.locals, 0);
            let arr = loc.get(&z.locals, 1);
            assert_eq!(string::to_utf8(z, s), "survivor");
            assert_eq!(array::length(z, arr), 2);
            assert_eq!(array::get(z, arr, 1), Some(Value::smallint(2)));
        });
    }

    #[test]
    fn young_survivors_age_and_promote() {
        let mut z = Context::for_tests();
        z.with_locals(1, |z, loc| {
            let s = string::new(z, "aging");
            loc.set(&mut z.locals, 0, s);
            assert_eq!(loc.get(&z.locals, 0).space(), Some(Space::Young));
            z.collect_garbage(false);
            assert_eq!(loc.get(&z.locals, 0).space(), Some(Space::Young));
            z.collect_garbage(false);
            assert_eq!(loc.get(&z.locals, 0).space(), Some(Space::Old));
            let s = loc.get(&z.locals, 0);
            assert_eq!(string::to_utf8(z, s), "aging");
        });
    }

    #[test]
    fn write_barrier_keeps_old_to_young_stores_alive() {
        let mut z = Context::for_tests();
        z.with_locals(1, |z, loc| {
            // An old-generation container, directly allocated there.
            let parent = z.alloc(
                AllocMode::Surv,
                Body::ArraySlots(crate::value::array::SlotsObj { slots: vec![Value::ZERO; 1] }),
            );
            loc.set(&mut z.locals, 0, parent);
            // A young object referenced only through the old parent; the
            // store goes through the barrier.
            let child = string::new(z, "young child");
            let parent = loc.get(&z.locals, 0);
            slots::set(z, parent, 0, child);
            z.collect_garbage(false);
            let parent = loc.get(&z.locals, 0);
            let child = slots::get(z, parent, 0);
            assert_eq!(string::to_utf8(z, child), "young child");
            // Another cycle after promotion still sees the same content.
            z.collect_garbage(false);
            let parent = loc.get(&z.locals, 0);
            let child = slots::get(z, parent, 0);
            assert_eq!(string::to_utf8(z, child), "young child");
        });
    }

    #[test]
    fn fixed_space_is_swept_and_reused() {
        let mut z = Context::for_tests();
        let dead = crate::value::stream::new_bytes(&mut z, b"dead".to_vec());
        let dead_raw = dead.raw();
        z.collect_garbage(true);
        // The unreferenced fixed-space object was swept; a new allocation
        // reuses its slot.
        let fresh = crate::value::stream::new_bytes(&mut z, b"fresh".to_vec());
        assert_eq!(fresh.raw(), dead_raw);
    }

    #[test]
    fn globals_and_stack_are_rewritten_consistently() {
        let mut z = Context::for_tests();
        let s = string::new(&mut z, "in a register");
        z.set_reg0(s);
        z.collect_garbage(false);
        let s = z.reg0();
        assert_eq!(string::to_utf8(&z, s), "in a register");
        z.collect_garbage(true);
        let s = z.reg0();
        assert_eq!(string::to_utf8(&z, s), "in a register");
    }
}
