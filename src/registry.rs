use std::cell::Cell;
use std::ptr;

use stackjump::Context;

thread_local! {
    /// The coroutine bookkeeping of the current thread. Null until `convert_thread_to_coroutine`
    /// installs a registry and again after `convert_coroutine_to_thread` removes it.
    ///
    /// Only a raw pointer lives in the slot. Code running on any of the thread's stacks reads it
    /// without holding a borrow across a switch.
    static REGISTRY: Cell<*mut Registry> = const { Cell::new(ptr::null_mut()) };
}

pub(crate) struct Registry {
    /// Owned, released on drop. Kept as a raw pointer because switches write through `active`.
    origin: *mut Context,
    /// The context executing right now, the origin or a created one.
    pub(crate) active: *mut Context,
}

impl Registry {
    /// Installs a registry for the calling thread with `origin` as the active context.
    pub(crate) fn install(origin: Box<Context>) -> *mut Registry {
        let origin = Box::into_raw(origin);
        let registry = Box::into_raw(Box::new(Registry {
            origin,
            active: origin,
        }));
        REGISTRY.with(|slot| slot.set(registry));
        registry
    }

    /// Removes the calling thread's registry, if any.
    pub(crate) fn uninstall() -> Option<Box<Registry>> {
        let registry = REGISTRY.with(|slot| slot.replace(ptr::null_mut()));
        if registry.is_null() {
            None
        } else {
            Some(unsafe { Box::from_raw(registry) })
        }
    }

    /// Returns the calling thread's registry, null if the thread was never converted.
    pub(crate) fn current() -> *mut Registry {
        REGISTRY.with(|slot| slot.get())
    }

    pub(crate) fn origin(&self) -> *mut Context {
        self.origin
    }

    pub(crate) fn is_origin_active(&self) -> bool {
        self.active == self.origin
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        drop(unsafe { Box::from_raw(self.origin) });
    }
}
