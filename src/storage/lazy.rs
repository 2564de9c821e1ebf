use std::sync::{Arc, Mutex};

/// Slot holding an artifact that is loaded on first use.
///
/// The slot lock is held for the whole load, so concurrent first callers
/// collapse into a single load and every caller observes either nothing or
/// the fully loaded value. A failed load leaves the slot empty.
#[derive(Debug)]
pub struct LazyArtifact<T> {
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> Default for LazyArtifact<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LazyArtifact<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Currently loaded value, without triggering a load.
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    /// Return the loaded value, running `load` if the slot is empty.
    pub fn get_or_try_load<E, F>(&self, load: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let mut guard = self.slot.lock().unwrap_or_else(|err| err.into_inner());
        if let Some(value) = guard.as_ref() {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(load()?);
        *guard = Some(Arc::clone(&value));
        Ok(value)
    }

    /// Replace the slot contents with an already built value.
    pub fn set(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        *self.slot.lock().unwrap_or_else(|err| err.into_inner()) = Some(Arc::clone(&value));
        value
    }

    /// Drop the loaded value; the next access loads again.
    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(|err| err.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn concurrent_first_use_loads_once() {
        let lazy = Arc::new(LazyArtifact::<Vec<u32>>::new());
        let loads = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                let loads = Arc::clone(&loads);
                thread::spawn(move || {
                    lazy.get_or_try_load(|| {
                        loads.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        Ok::<_, String>(vec![1, 2, 3])
                    })
                    .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(*handle.join().unwrap(), vec![1, 2, 3]);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_leaves_slot_empty() {
        let lazy = LazyArtifact::<u32>::new();
        let err = lazy.get_or_try_load(|| Err::<u32, _>("missing")).unwrap_err();
        assert_eq!(err, "missing");
        assert!(lazy.get().is_none());
        assert_eq!(*lazy.get_or_try_load(|| Ok::<_, &str>(7)).unwrap(), 7);
    }

    #[test]
    fn clear_forces_reload() {
        let lazy = LazyArtifact::new();
        lazy.set(1u32);
        lazy.clear();
        assert_eq!(*lazy.get_or_try_load(|| Ok::<_, ()>(2)).unwrap(), 2);
    }
}
