use rhai::Dynamic;
use std::collections::HashMap;

/// Opaque strong reference to a script object. The object stays alive and
/// addressable from native code for as long as the handle is held; clearing
/// the owning heap (domain teardown) invalidates every outstanding handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle(u32);

impl ObjectHandle {
    pub const INVALID: ObjectHandle = ObjectHandle(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Owner of every script object referenced from native code. Each `acquire`
/// must be paired with exactly one `release`; resolving or releasing a stale
/// handle is a lifecycle bug and aborts.
#[derive(Default)]
pub struct ObjectHeap {
    objects: HashMap<u32, Dynamic>,
    next: u32,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, object: Dynamic) -> ObjectHandle {
        let id = self.next;
        assert!(id != u32::MAX, "object heap exhausted its handle space");
        self.next += 1;
        self.objects.insert(id, object);
        ObjectHandle(id)
    }

    pub fn release(&mut self, handle: ObjectHandle) {
        let freed = self.objects.remove(&handle.0);
        assert!(freed.is_some(), "released a stale or invalid object handle");
    }

    pub fn resolve(&self, handle: ObjectHandle) -> &Dynamic {
        self.objects.get(&handle.0).expect("resolved a stale or invalid object handle")
    }

    pub fn resolve_mut(&mut self, handle: ObjectHandle) -> &mut Dynamic {
        self.objects.get_mut(&handle.0).expect("resolved a stale or invalid object handle")
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_roundtrip() {
        let mut heap = ObjectHeap::new();
        let a = heap.acquire(Dynamic::from(1_i64));
        let b = heap.acquire(Dynamic::from(2_i64));
        assert_ne!(a, b);
        assert_eq!(heap.resolve(a).clone_cast::<i64>(), 1);
        assert_eq!(heap.resolve(b).clone_cast::<i64>(), 2);
        heap.release(a);
        heap.release(b);
        assert!(heap.is_empty());
    }

    #[test]
    fn handles_are_not_reused_after_release() {
        let mut heap = ObjectHeap::new();
        let a = heap.acquire(Dynamic::UNIT);
        heap.release(a);
        let b = heap.acquire(Dynamic::UNIT);
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic(expected = "stale or invalid")]
    fn resolving_freed_handle_aborts() {
        let mut heap = ObjectHeap::new();
        let handle = heap.acquire(Dynamic::UNIT);
        heap.release(handle);
        heap.resolve(handle);
    }

    #[test]
    #[should_panic(expected = "stale or invalid")]
    fn releasing_sentinel_aborts() {
        let mut heap = ObjectHeap::new();
        heap.release(ObjectHandle::INVALID);
    }
}
