//! Specialized collection types
//!
//! [`HandleManager`] hands out stamped 32-bit handles to objects stored
//! in a dense array. Slot-map arenas are re-exported for the manager's
//! own side tables.

pub use slotmap::{new_key_type, SlotMap};

/// Opaque stamped handle: `(stamp << 16) | virtual_index`
pub type Handle = u32;

/// Handle value that never resolves
pub const INVALID_HANDLE: Handle = 0xffff_ffff;

const INVALID_ID: u16 = 0xffff;

/// Hard limit on live objects, imposed by the 16-bit index half of a handle
pub const MAX_HANDLES: usize = 0xffff;

/// Stable-handle allocator over a dense object array
///
/// Objects live contiguously in `[0, len())`. A handle names a *virtual*
/// slot which maps to the current physical position; removal moves the
/// last object into the hole and only the mapping changes. Every removal
/// bumps the virtual slot's stamp so stale handles stop resolving.
#[derive(Debug, Clone)]
pub struct HandleManager<T> {
    objects: Vec<T>,
    /// virtual -> physical
    out_to_in: Vec<u16>,
    /// physical -> virtual; `[len, len + nb_free)` holds recyclable virtual slots
    in_to_out: Vec<u16>,
    stamps: Vec<u16>,
    nb_free: usize,
}

impl<T> Default for HandleManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleManager<T> {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            out_to_in: Vec::new(),
            in_to_out: Vec::new(),
            stamps: Vec::new(),
            nb_free: 0,
        }
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no object is registered
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of virtual slots allocated so far
    pub fn capacity(&self) -> usize {
        self.out_to_in.len()
    }

    /// Live objects in physical order
    pub fn objects(&self) -> &[T] {
        &self.objects
    }

    /// Register an object and return its handle
    ///
    /// Returns `None` once [`MAX_HANDLES`] objects are live.
    pub fn add(&mut self, object: T) -> Option<Handle> {
        let physical = self.objects.len();

        if self.nb_free > 0 {
            // Recycle the most recently freed virtual slot
            let virtual_index = self.in_to_out[physical];
            self.objects.push(object);
            self.out_to_in[virtual_index as usize] = physical as u16;
            self.nb_free -= 1;
            return Some(Self::make_handle(self.stamps[virtual_index as usize], virtual_index));
        }

        if physical == self.capacity() && !self.grow() {
            log::error!("HandleManager: cannot register more than {} objects", MAX_HANDLES);
            return None;
        }

        // No free slot: virtual and physical indices coincide
        self.objects.push(object);
        self.out_to_in[physical] = physical as u16;
        self.in_to_out[physical] = physical as u16;
        Some(Self::make_handle(self.stamps[physical], physical as u16))
    }

    fn grow(&mut self) -> bool {
        let current = self.capacity();
        if current >= MAX_HANDLES {
            return false;
        }
        let new_capacity = if current == 0 { 2 } else { (current * 2).min(MAX_HANDLES) };
        let extra = new_capacity - current;
        if self.out_to_in.try_reserve(extra).is_err()
            || self.in_to_out.try_reserve(extra).is_err()
            || self.stamps.try_reserve(extra).is_err()
            || self.objects.try_reserve(new_capacity - self.objects.len()).is_err()
        {
            log::error!("HandleManager: out of memory growing to {} slots", new_capacity);
            return false;
        }
        self.out_to_in.resize(new_capacity, INVALID_ID);
        self.in_to_out.resize(new_capacity, INVALID_ID);
        self.stamps.resize(new_capacity, 0);
        true
    }

    /// Unregister the object behind `handle` and return it
    ///
    /// Stale or out-of-range handles are ignored and yield `None`.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let physical = self.physical_index(handle)?;
        let virtual_index = (handle & 0xffff) as u16;

        let last = self.objects.len() - 1;
        let object = self.objects.swap_remove(physical);

        // The last object now lives at `physical`
        let last_virtual = self.in_to_out[last];
        self.out_to_in[last_virtual as usize] = physical as u16;
        self.in_to_out[physical] = last_virtual;

        // Park the freed virtual slot right after the live range
        self.in_to_out[last] = virtual_index;
        self.out_to_in[virtual_index as usize] = INVALID_ID;
        self.stamps[virtual_index as usize] = self.stamps[virtual_index as usize].wrapping_add(1);
        self.nb_free += 1;

        Some(object)
    }

    /// Resolve a handle
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.physical_index(handle).map(|i| &self.objects[i])
    }

    /// Resolve a handle mutably
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.physical_index(handle).map(move |i| &mut self.objects[i])
    }

    /// Whether `handle` currently resolves to an object
    pub fn is_valid(&self, handle: Handle) -> bool {
        self.physical_index(handle).is_some()
    }

    /// Handle of the object currently stored at physical position `index`
    pub fn handle_at(&self, index: usize) -> Option<Handle> {
        if index >= self.objects.len() {
            return None;
        }
        let virtual_index = self.in_to_out[index];
        Some(Self::make_handle(self.stamps[virtual_index as usize], virtual_index))
    }

    /// Reorder the dense array so that `new[i] = old[ranks[i]]`
    ///
    /// Handles keep resolving to the same objects. Recyclable virtual
    /// slots are unaffected since they live outside the live range.
    /// Returns `false` and leaves everything untouched unless `ranks` is
    /// a permutation of `0..len()`.
    pub fn remap(&mut self, ranks: &[u32]) -> bool {
        let n = self.objects.len();
        if ranks.len() != n {
            return false;
        }
        let mut seen = vec![false; n];
        for &rank in ranks {
            let rank = rank as usize;
            if rank >= n || seen[rank] {
                return false;
            }
            seen[rank] = true;
        }

        let old_in_to_out: Vec<u16> = self.in_to_out[..n].to_vec();
        for (i, &rank) in ranks.iter().enumerate() {
            let virtual_index = old_in_to_out[rank as usize];
            self.in_to_out[i] = virtual_index;
            self.out_to_in[virtual_index as usize] = i as u16;
        }

        // Apply the permutation in place, one cycle at a time
        let mut visited = vec![false; n];
        for start in 0..n {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let mut current = start;
            loop {
                let next = ranks[current] as usize;
                if next == start {
                    break;
                }
                self.objects.swap(current, next);
                visited[next] = true;
                current = next;
            }
        }
        true
    }

    fn physical_index(&self, handle: Handle) -> Option<usize> {
        let virtual_index = (handle & 0xffff) as usize;
        let stamp = (handle >> 16) as u16;
        if virtual_index >= self.capacity() {
            return None;
        }
        let physical = self.out_to_in[virtual_index];
        if physical == INVALID_ID || self.stamps[virtual_index] != stamp {
            return None;
        }
        Some(physical as usize)
    }

    fn make_handle(stamp: u16, virtual_index: u16) -> Handle {
        (u32::from(stamp) << 16) | u32::from(virtual_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_add_and_get() {
        let mut hm = HandleManager::new();
        let a = hm.add("a").unwrap();
        let b = hm.add("b").unwrap();
        assert_eq!(hm.get(a), Some(&"a"));
        assert_eq!(hm.get(b), Some(&"b"));
        assert_eq!(hm.len(), 2);
    }

    #[test]
    fn test_stale_handle_after_remove() {
        let mut hm = HandleManager::new();
        let a = hm.add(1).unwrap();
        assert_eq!(hm.remove(a), Some(1));
        assert_eq!(hm.get(a), None);
        assert_eq!(hm.remove(a), None);

        // Slot is recycled with a new stamp
        let b = hm.add(2).unwrap();
        assert_eq!(b & 0xffff, a & 0xffff);
        assert_ne!(b, a);
        assert_eq!(hm.get(a), None);
        assert_eq!(hm.get(b), Some(&2));
    }

    #[test]
    fn test_invalid_handles_are_ignored() {
        let mut hm: HandleManager<i32> = HandleManager::new();
        assert_eq!(hm.remove(12345), None);
        assert_eq!(hm.get(INVALID_HANDLE), None);
        hm.add(7).unwrap();
        assert_eq!(hm.remove(0xffff_0000), None);
        assert_eq!(hm.len(), 1);
    }

    #[test]
    fn test_remove_keeps_array_dense() {
        let mut hm = HandleManager::new();
        let handles: Vec<_> = (0..5).map(|i| hm.add(i).unwrap()).collect();
        hm.remove(handles[1]);
        assert_eq!(hm.objects(), &[0, 4, 2, 3]);
        assert_eq!(hm.get(handles[4]), Some(&4));
    }

    #[test]
    fn test_capacity_doubles() {
        let mut hm = HandleManager::new();
        hm.add(0).unwrap();
        assert_eq!(hm.capacity(), 2);
        hm.add(1).unwrap();
        hm.add(2).unwrap();
        assert_eq!(hm.capacity(), 4);
    }

    #[test]
    fn test_capacity_hard_limit() {
        let mut hm = HandleManager::new();
        for i in 0..MAX_HANDLES {
            assert!(hm.add(i).is_some());
        }
        assert!(hm.add(MAX_HANDLES).is_none());
        assert_eq!(hm.len(), MAX_HANDLES);
    }

    #[test]
    fn test_random_add_remove_sequences() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut hm = HandleManager::new();
        let mut live: Vec<(Handle, u32)> = Vec::new();
        let mut dead: Vec<Handle> = Vec::new();

        for step in 0..2000u32 {
            if live.is_empty() || rng.gen_bool(0.6) {
                let h = hm.add(step).unwrap();
                live.push((h, step));
            } else {
                let idx = rng.gen_range(0..live.len());
                let (h, value) = live.swap_remove(idx);
                assert_eq!(hm.remove(h), Some(value));
                dead.push(h);
            }
            for &(h, value) in &live {
                assert_eq!(hm.get(h), Some(&value));
            }
        }
        for h in dead {
            assert!(!hm.is_valid(h) || live.iter().any(|&(l, _)| l == h));
        }
        assert_eq!(hm.len(), live.len());
    }

    #[test]
    fn test_remap_preserves_handles() {
        let mut hm = HandleManager::new();
        let handles: Vec<_> = (0..4).map(|i| hm.add(i * 10).unwrap()).collect();
        assert!(hm.remap(&[3, 1, 0, 2]));
        assert_eq!(hm.objects(), &[30, 10, 0, 20]);
        for (i, &h) in handles.iter().enumerate() {
            assert_eq!(hm.get(h), Some(&(i as i32 * 10)));
        }
    }

    #[test]
    fn test_remap_with_free_slots() {
        let mut hm = HandleManager::new();
        let handles: Vec<_> = (0..6).map(|i| hm.add(i).unwrap()).collect();
        hm.remove(handles[1]);
        hm.remove(handles[4]);
        // Live: [0, 5, 2, 3]
        assert_eq!(hm.objects(), &[0, 5, 2, 3]);
        assert!(hm.remap(&[2, 3, 1, 0]));
        assert_eq!(hm.objects(), &[2, 3, 5, 0]);

        for &i in &[0usize, 2, 3, 5] {
            assert_eq!(hm.get(handles[i]), Some(&(i as i32)));
        }
        assert_eq!(hm.get(handles[1]), None);
        assert_eq!(hm.get(handles[4]), None);

        // Recycled slots still come back with fresh stamps
        let c = hm.add(40).unwrap();
        let d = hm.add(10).unwrap();
        assert_eq!(hm.get(c), Some(&40));
        assert_eq!(hm.get(d), Some(&10));
        assert!(c != handles[4] && d != handles[1]);
        for &i in &[0usize, 2, 3, 5] {
            assert_eq!(hm.get(handles[i]), Some(&(i as i32)));
        }
    }

    #[test]
    fn test_remap_rejects_bad_ranks() {
        let mut hm = HandleManager::new();
        for i in 0..3 {
            hm.add(i).unwrap();
        }
        assert!(!hm.remap(&[0, 1]));
        assert!(!hm.remap(&[0, 1, 3]));
        assert!(!hm.remap(&[0, 1, 1]));
        assert_eq!(hm.objects(), &[0, 1, 2]);
    }
}
