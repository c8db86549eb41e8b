//! Scoped ownership of native engine resources.
//!
//! Backends hand out raw resources (a loaded model, a KV context) that must be
//! freed exactly once. `Scoped<T>` is the one guard type for all of them: it
//! is move-only, derefs to the resource, and calls [`Release::release`] when
//! dropped, on success and error paths alike.

use std::fmt;
use std::ops::{Deref, DerefMut};

/// A resource with an explicit teardown step (e.g. `llama_free`, `llama_free_model`).
pub trait Release {
    fn release(&mut self);
}

pub struct Scoped<T: Release> {
    inner: T,
}

impl<T: Release> Scoped<T> {
    #[inline]
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: Release> Deref for Scoped<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Release> DerefMut for Scoped<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Release> Drop for Scoped<T> {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl<T: Release + fmt::Debug> fmt::Debug for Scoped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scoped").field(&self.inner).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Probe {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Release for Probe {
        fn release(&mut self) {
            self.log.borrow_mut().push(self.name);
        }
    }

    #[test]
    fn releases_once_on_drop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let _g = Scoped::new(Probe { name: "a", log: log.clone() });
        }
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn struct_fields_release_in_declaration_order() {
        struct Pair {
            _first: Scoped<Probe>,
            _second: Scoped<Probe>,
        }
        let log = Rc::new(RefCell::new(Vec::new()));
        drop(Pair {
            _first: Scoped::new(Probe { name: "context", log: log.clone() }),
            _second: Scoped::new(Probe { name: "model", log: log.clone() }),
        });
        assert_eq!(*log.borrow(), vec!["context", "model"]);
    }

    #[test]
    fn releases_during_early_return() {
        fn fallible(log: Rc<RefCell<Vec<&'static str>>>) -> Result<(), ()> {
            let _g = Scoped::new(Probe { name: "batch", log });
            Err(())
        }
        let log = Rc::new(RefCell::new(Vec::new()));
        assert!(fallible(log.clone()).is_err());
        assert_eq!(*log.borrow(), vec!["batch"]);
    }
}
