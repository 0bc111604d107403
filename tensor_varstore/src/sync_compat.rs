// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Lock primitives that can be swapped for loom's model checker.
//!
//! Normal builds use `parking_lot`. With the `loom` feature the same names
//! resolve to thin wrappers over `loom::sync` that drop the poisoning
//! `Result`, so the registry and value code is shared between both builds.

#[cfg(not(feature = "loom"))]
pub use parking_lot::{Mutex, MutexGuard, RwLock};

#[cfg(feature = "loom")]
pub use self::loom_compat::{Mutex, MutexGuard, RwLock};

#[cfg(feature = "loom")]
mod loom_compat {
    use std::fmt;

    pub type MutexGuard<'a, T> = loom::sync::MutexGuard<'a, T>;

    /// `parking_lot::Mutex` shaped wrapper (no `Result` from `lock`).
    pub struct Mutex<T>(loom::sync::Mutex<T>);

    impl<T> Mutex<T> {
        pub fn new(t: T) -> Self {
            Self(loom::sync::Mutex::new(t))
        }

        pub fn lock(&self) -> MutexGuard<'_, T> {
            self.0.lock().unwrap()
        }
    }

    impl<T: Default> Default for Mutex<T> {
        fn default() -> Self {
            Self::new(T::default())
        }
    }

    impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.0.try_lock() {
                Ok(guard) => f.debug_tuple("Mutex").field(&*guard).finish(),
                Err(_) => f.debug_tuple("Mutex").field(&"<locked>").finish(),
            }
        }
    }

    /// `parking_lot::RwLock` shaped wrapper (no `Result` from `read`/`write`).
    pub struct RwLock<T>(loom::sync::RwLock<T>);

    impl<T> RwLock<T> {
        pub fn new(t: T) -> Self {
            Self(loom::sync::RwLock::new(t))
        }

        pub fn read(&self) -> loom::sync::RwLockReadGuard<'_, T> {
            self.0.read().unwrap()
        }

        pub fn write(&self) -> loom::sync::RwLockWriteGuard<'_, T> {
            self.0.write().unwrap()
        }
    }

    impl<T: fmt::Debug> fmt::Debug for RwLock<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.0.try_read() {
                Ok(guard) => f.debug_tuple("RwLock").field(&*guard).finish(),
                Err(_) => f.debug_tuple("RwLock").field(&"<locked>").finish(),
            }
        }
    }
}
