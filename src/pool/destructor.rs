// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Destructor queue (§4.3). Rust's ownership already runs `Drop` for values a
// pool stores directly; this queue exists for the same reason rspamd's did —
// a caller hands the pool cleanup for a resource the pool doesn't actually
// own a typed handle to (an external library handle stored via
// `Pool::set_variable`'s `Box<dyn Any>`, a side-effect like fsyncing a file,
// an FFI callback). Destructors run in registration order (FIFO) at
// teardown, exactly once each, the same way `rspamd_mempool_destructors_enforce`
// walks its list before the pool's own memory comes down.

pub struct DestructorHandle(usize);

enum Slot {
    Pending(Box<dyn FnOnce() + Send>),
    Run,
}

#[derive(Default)]
pub struct DestructorQueue {
    entries: Vec<Slot>,
}

impl DestructorQueue {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a destructor, returning a handle that can later be passed
    /// to [`replace`](Self::replace).
    pub fn add<F>(&mut self, f: F) -> DestructorHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let idx = self.entries.len();
        self.entries.push(Slot::Pending(Box::new(f)));
        DestructorHandle(idx)
    }

    /// Replace an already-registered destructor with a new one without
    /// changing its position in the run order. A no-op if `handle` already
    /// ran or is out of range — replacing a destructor that fired is a
    /// no-op condition per the pool's error-handling rules, not a fault.
    pub fn replace<F>(&mut self, handle: &DestructorHandle, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(slot @ Slot::Pending(_)) = self.entries.get_mut(handle.0) {
            *slot = Slot::Pending(Box::new(f));
        }
    }

    /// Run every pending destructor once, in FIFO order, and mark the
    /// queue empty. Safe to call more than once — subsequent calls run
    /// nothing.
    pub fn run_all(&mut self) {
        for slot in self.entries.iter_mut() {
            if let Slot::Pending(_) = slot {
                let ran = std::mem::replace(slot, Slot::Run);
                if let Slot::Pending(f) = ran {
                    f();
                }
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|s| matches!(s, Slot::Pending(_)))
            .count()
    }
}

impl Drop for DestructorQueue {
    fn drop(&mut self) {
        self.run_all();
    }
}
