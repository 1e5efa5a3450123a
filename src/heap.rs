//! Heap arena for allocation-backed values (spec §3 Allocation).
//!
//! Reference-counted in the same shape as the teacher crate's `heap.rs`:
//! `dec_ref` walks the graph iteratively with an explicit stack so freeing a
//! deep structure never recurses, and every payload variant that can hold
//! child references contributes them through [`enqueue_children`].

use ahash::AHashMap;

use crate::intern::StringId;
use crate::value::{FunctionId, Value};

/// Index into [`Heap`]'s arena (spec §3 Allocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationId(u32);

impl AllocationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The payload of one heap allocation (spec §3: `Object`, `Array`, `String`,
/// `Function`, `Closure`).
///
/// `Function` here is a bare bytecode function value with no captured
/// scope; `Closure` pairs a function with the closure-scope vector a
/// `ScopePush`-bearing function needs (spec §4.1 pass 2, §4.2 `ClosureNew`).
#[derive(Debug, Clone)]
pub enum Allocation {
    Object(AHashMap<StringId, Value>),
    Array(Vec<Value>),
    String(String),
    Function(FunctionId),
    Closure { function: FunctionId, scope: Vec<Value> },
}

impl Allocation {
    /// Type code packed into an allocation's header word (spec §4.3 step 3:
    /// `(typeCode << 12) | size`).
    pub fn type_code(&self) -> u8 {
        match self {
            Allocation::Object(_) => 0,
            Allocation::Array(_) => 1,
            Allocation::String(_) => 2,
            Allocation::Function(_) => 3,
            Allocation::Closure { .. } => 4,
        }
    }

    /// Payload size in bytes, excluding header word and (for arrays) the
    /// length prefix. Must never exceed 4095 (spec §4.3 encoder invariant).
    pub fn payload_size(&self) -> usize {
        match self {
            Allocation::Object(props) => props.len() * 4,
            Allocation::Array(items) => items.len() * 2,
            Allocation::String(s) => s.len(),
            Allocation::Function(_) => 2,
            Allocation::Closure { scope, .. } => 2 + scope.len() * 2,
        }
    }
}

#[derive(Clone)]
struct Entry {
    refcount: usize,
    data: Allocation,
}

/// Reference-counted arena backing every `Value::Reference`.
///
/// IDs are never reused within one arena's lifetime; a fresh `Heap` is
/// created per evaluation the same way the teacher crate's `Heap::clear`
/// resets state between runs rather than recycling slots mid-run.
#[derive(Default, Clone)]
pub struct Heap {
    objects: Vec<Option<Entry>>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, data: Allocation) -> AllocationId {
        let id = AllocationId(self.objects.len() as u32);
        self.objects.push(Some(Entry { refcount: 1, data }));
        id
    }

    /// # Panics
    /// Panics if `id` was already freed.
    pub fn inc_ref(&mut self, id: AllocationId) {
        let entry = self.objects[id.index()].as_mut().expect("Heap::inc_ref: already freed");
        entry.refcount += 1;
    }

    /// Decrements the refcount, freeing `id` (and cascading through any
    /// children it alone was keeping alive) once it reaches zero. Iterative
    /// to avoid blowing the stack on deep object graphs.
    ///
    /// # Panics
    /// Panics if `id` was already freed.
    pub fn dec_ref(&mut self, id: AllocationId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let entry = self.objects[current.index()]
                .as_mut()
                .expect("Heap::dec_ref: already freed");
            if entry.refcount > 1 {
                entry.refcount -= 1;
                continue;
            }
            if let Some(freed) = self.objects[current.index()].take() {
                enqueue_children(&freed.data, &mut stack);
            }
        }
    }

    /// # Panics
    /// Panics if `id` was already freed.
    pub fn get(&self, id: AllocationId) -> &Allocation {
        &self.objects[id.index()].as_ref().expect("Heap::get: already freed").data
    }

    /// # Panics
    /// Panics if `id` was already freed.
    pub fn get_mut(&mut self, id: AllocationId) -> &mut Allocation {
        &mut self.objects[id.index()].as_mut().expect("Heap::get_mut: already freed").data
    }

    pub fn is_live(&self, id: AllocationId) -> bool {
        matches!(self.objects.get(id.index()), Some(Some(_)))
    }

    /// Every currently-live allocation, in arena order. Used by the GC root
    /// walk and the snapshot encoder's breadth-first allocation-ID pass.
    pub fn live_ids(&self) -> impl Iterator<Item = AllocationId> + '_ {
        self.objects
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|_| AllocationId(i as u32)))
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Frees every live allocation not in `reachable` (spec §4.4: "a
    /// stop-the-world mark-and-sweep over the heap arena"). The caller marks
    /// by walking roots outward with [`Heap::get`]; this only performs the
    /// sweep half, since refcounting already keeps interior cycles aside as
    /// the one case it can't reclaim on its own.
    pub fn sweep(&mut self, reachable: &ahash::AHashSet<AllocationId>) {
        for (index, slot) in self.objects.iter_mut().enumerate() {
            if slot.is_some() && !reachable.contains(&AllocationId(index as u32)) {
                *slot = None;
            }
        }
    }
}

fn enqueue_children(data: &Allocation, stack: &mut Vec<AllocationId>) {
    match data {
        Allocation::Object(props) => {
            for value in props.values() {
                if let Value::Reference(id) = value {
                    stack.push(*id);
                }
            }
        }
        Allocation::Array(items) => {
            for value in items {
                if let Value::Reference(id) = value {
                    stack.push(*id);
                }
            }
        }
        Allocation::Closure { scope, .. } => {
            for value in scope {
                if let Value::Reference(id) = value {
                    stack.push(*id);
                }
            }
        }
        Allocation::String(_) | Allocation::Function(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dec_ref_to_zero_frees_the_slot() {
        let mut heap = Heap::new();
        let id = heap.allocate(Allocation::String("hi".to_owned()));
        assert!(heap.is_live(id));
        heap.dec_ref(id);
        assert!(!heap.is_live(id));
    }

    #[test]
    fn inc_ref_keeps_the_allocation_alive_across_one_dec_ref() {
        let mut heap = Heap::new();
        let id = heap.allocate(Allocation::String("hi".to_owned()));
        heap.inc_ref(id);
        heap.dec_ref(id);
        assert!(heap.is_live(id));
        heap.dec_ref(id);
        assert!(!heap.is_live(id));
    }

    #[test]
    fn freeing_an_array_cascades_to_referenced_children() {
        let mut heap = Heap::new();
        let child = heap.allocate(Allocation::String("child".to_owned()));
        let parent = heap.allocate(Allocation::Array(vec![Value::Reference(child)]));
        heap.dec_ref(parent);
        assert!(!heap.is_live(child));
    }
}
