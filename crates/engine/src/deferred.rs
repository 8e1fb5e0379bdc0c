//! Values materialized on first access
//!
//! A [`Deferred`] starts either loaded (holding its value) or unloaded
//! (holding a one-shot [`Loader`]). The first read runs the loader and
//! caches the result; every later read returns the cached value. A loader
//! runs at most once: if it fails, the error is returned to that caller and
//! every later read reports [`Error::LoaderConsumed`].
//!
//! Deferred values are not internally synchronized. They are `Send` but not
//! `Sync`, matching the single-writer ownership of an archive.

use std::cell::Cell;
use std::fmt;

use once_cell::unsync::OnceCell;
use psrstore_core::{Error, Result};

/// One-shot producer of a deferred value
pub trait Loader<T>: fmt::Debug + Send {
    /// Produce the value, consuming the loader
    fn load(self: Box<Self>) -> Result<T>;

    /// Independent copy of this loader
    fn boxed_clone(&self) -> Box<dyn Loader<T>>;

    /// Human-readable name of what is loaded, used in errors
    fn label(&self) -> String {
        "deferred value".to_string()
    }
}

/// Observable state of a [`Deferred`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    /// Loader pending
    Unloaded,
    /// Value present
    Loaded,
    /// Loader ran and failed
    Consumed,
}

/// A value that may be loaded lazily
pub struct Deferred<T> {
    value: OnceCell<T>,
    loader: Cell<Option<Box<dyn Loader<T>>>>,
    label: String,
}

impl<T> Deferred<T> {
    /// Already-loaded value
    pub fn new(value: T) -> Self {
        Deferred {
            value: OnceCell::from(value),
            loader: Cell::new(None),
            label: String::new(),
        }
    }

    /// Unloaded value produced by `loader` on first access
    pub fn lazy(loader: Box<dyn Loader<T>>) -> Self {
        let label = loader.label();
        Deferred {
            value: OnceCell::new(),
            loader: Cell::new(Some(loader)),
            label,
        }
    }

    /// Value, running the loader if needed
    pub fn get(&self) -> Result<&T> {
        self.value.get_or_try_init(|| match self.loader.take() {
            Some(loader) => loader.load(),
            None => Err(Error::LoaderConsumed(self.label.clone())),
        })
    }

    /// Mutable value, running the loader if needed
    pub fn get_mut(&mut self) -> Result<&mut T> {
        self.get()?;
        self.value
            .get_mut()
            .ok_or_else(|| Error::LoaderConsumed(self.label.clone()))
    }

    /// Replace the value, discarding any pending loader
    pub fn set(&mut self, value: T) {
        self.value = OnceCell::from(value);
        self.loader = Cell::new(None);
    }

    /// Discard the value and install a new loader
    pub fn set_loader(&mut self, loader: Box<dyn Loader<T>>) {
        self.label = loader.label();
        self.value = OnceCell::new();
        self.loader = Cell::new(Some(loader));
    }

    /// Current state, without loading
    pub fn state(&self) -> DeferredState {
        if self.value.get().is_some() {
            return DeferredState::Loaded;
        }
        let loader = self.loader.take();
        let state = if loader.is_some() {
            DeferredState::Unloaded
        } else {
            DeferredState::Consumed
        };
        self.loader.set(loader);
        state
    }

    /// True once the value is present
    pub fn is_loaded(&self) -> bool {
        self.value.get().is_some()
    }

    /// Take the value, running the loader if needed
    pub fn into_inner(self) -> Result<T> {
        self.get()?;
        let label = self.label;
        self.value
            .into_inner()
            .ok_or(Error::LoaderConsumed(label))
    }
}

impl<T: Default> Default for Deferred<T> {
    fn default() -> Self {
        Deferred::new(T::default())
    }
}

impl<T: Clone> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        if let Some(value) = self.value.get() {
            return Deferred {
                value: OnceCell::from(value.clone()),
                loader: Cell::new(None),
                label: self.label.clone(),
            };
        }
        let loader = self.loader.take();
        let copy = loader.as_ref().map(|l| l.boxed_clone());
        self.loader.set(loader);
        Deferred {
            value: OnceCell::new(),
            loader: Cell::new(copy),
            label: self.label.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.get() {
            Some(value) => f.debug_tuple("Deferred").field(value).finish(),
            None => write!(f, "Deferred({:?} {})", self.state(), self.label),
        }
    }
}
