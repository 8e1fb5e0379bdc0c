//! Typed extension registry
//!
//! Archives and integrations carry optional metadata blocks ("extensions").
//! Each scope declares the closed set of extension types it may hold with
//! [`extension_set!`], which generates a slot enum plus the [`Extension`]
//! projections for every member. A [`Registry`] holds at most one slot per
//! kind and looks members up by type:
//!
//! ```ignore
//! let info = archive.extensions().find::<ObsInfo>();
//! let history = archive.extensions_mut().get_or_create::<ProcessingHistory>();
//! ```
//!
//! Every generated slot enum also has an `Unknown` variant carrying a
//! record the codec did not recognise, so it can be written back unchanged.

use std::fmt;

/// Kind of a slot, used for uniqueness and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTag<'a> {
    /// A member of the scope's extension set
    Known(&'static str),
    /// An unrecognised record, keyed by record name
    Unknown(&'a str),
}

impl fmt::Display for SlotTag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotTag::Known(name) => f.write_str(name),
            SlotTag::Unknown(name) => write!(f, "unknown record {}", name),
        }
    }
}

/// Slot enum of one extension scope
pub trait ExtensionSlot: Clone + fmt::Debug {
    /// Kind of the value held in this slot
    fn tag(&self) -> SlotTag<'_>;
}

/// A type that can live in slots of scope `S`
pub trait Extension<S: ExtensionSlot>: Clone + Default + Sized + 'static {
    /// Kind name of this extension
    const NAME: &'static str;

    /// Borrow the extension if `slot` holds one
    fn project(slot: &S) -> Option<&Self>;

    /// Mutably borrow the extension if `slot` holds one
    fn project_mut(slot: &mut S) -> Option<&mut Self>;

    /// Wrap in a slot
    fn into_slot(self) -> S;

    /// Unwrap a slot, returning it unchanged if it holds another kind
    fn from_slot(slot: S) -> std::result::Result<Self, S>;
}

/// At most one extension of each kind, in attachment order
#[derive(Debug, Clone)]
pub struct Registry<S> {
    slots: Vec<S>,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Registry { slots: Vec::new() }
    }
}

impl<S: ExtensionSlot> Registry<S> {
    /// Empty registry
    pub fn new() -> Self {
        Registry::default()
    }

    /// Number of attached slots, unknown records included
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if nothing is attached
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots in attachment order
    pub fn iter(&self) -> std::slice::Iter<'_, S> {
        self.slots.iter()
    }

    /// Tags of all slots in attachment order
    pub fn tags(&self) -> Vec<SlotTag<'_>> {
        self.slots.iter().map(|s| s.tag()).collect()
    }

    fn position<T: Extension<S>>(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.tag() == SlotTag::Known(T::NAME))
    }

    /// Attach `ext`, replacing and returning any extension of the same kind
    pub fn attach<T: Extension<S>>(&mut self, ext: T) -> Option<T> {
        match self.position::<T>() {
            Some(i) => {
                let previous = std::mem::replace(&mut self.slots[i], ext.into_slot());
                T::from_slot(previous).ok()
            }
            None => {
                self.slots.push(ext.into_slot());
                None
            }
        }
    }

    /// Attach a slot of any kind, replacing one with the same tag
    pub fn attach_slot(&mut self, slot: S) -> Option<S> {
        let existing = {
            let tag = slot.tag();
            self.slots.iter().position(|s| s.tag() == tag)
        };
        match existing {
            Some(i) => Some(std::mem::replace(&mut self.slots[i], slot)),
            None => {
                self.slots.push(slot);
                None
            }
        }
    }

    /// Extension of kind `T`, if attached
    pub fn find<T: Extension<S>>(&self) -> Option<&T> {
        self.slots.iter().find_map(T::project)
    }

    /// Mutable extension of kind `T`, if attached
    pub fn find_mut<T: Extension<S>>(&mut self) -> Option<&mut T> {
        self.slots.iter_mut().find_map(T::project_mut)
    }

    /// True if an extension of kind `T` is attached
    pub fn contains<T: Extension<S>>(&self) -> bool {
        self.position::<T>().is_some()
    }

    /// Extension of kind `T`, attaching a default one if absent
    pub fn get_or_create<T: Extension<S>>(&mut self) -> &mut T {
        let index = match self.position::<T>() {
            Some(i) => i,
            None => {
                self.slots.push(T::default().into_slot());
                self.slots.len() - 1
            }
        };
        match T::project_mut(&mut self.slots[index]) {
            Some(ext) => ext,
            None => unreachable!("slot tagged {} holds another kind", T::NAME),
        }
    }

    /// Detach and return the extension of kind `T`
    pub fn remove<T: Extension<S>>(&mut self) -> Option<T> {
        let i = self.position::<T>()?;
        match T::from_slot(self.slots.remove(i)) {
            Ok(ext) => Some(ext),
            Err(slot) => {
                self.slots.insert(i, slot);
                None
            }
        }
    }

    /// Detach every slot matching `keep == false`
    pub fn retain(&mut self, keep: impl FnMut(&S) -> bool) {
        self.slots.retain(keep);
    }
}

/// Declare the extension set of one scope.
///
/// Generates the slot enum (with an extra `Unknown(UnknownRecord)` variant),
/// its [`ExtensionSlot`] impl, and an [`Extension`] impl for each member.
/// Variant names double as kind names.
macro_rules! extension_set {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident($ty:ty) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant($ty), )+
            /// Record not recognised by the codec, written back unchanged
            Unknown($crate::extensions::UnknownRecord),
        }

        impl $crate::registry::ExtensionSlot for $name {
            fn tag(&self) -> $crate::registry::SlotTag<'_> {
                match self {
                    $( $name::$variant(_) => $crate::registry::SlotTag::Known(stringify!($variant)), )+
                    $name::Unknown(record) => $crate::registry::SlotTag::Unknown(record.name()),
                }
            }
        }

        $(
            impl $crate::registry::Extension<$name> for $ty {
                const NAME: &'static str = stringify!($variant);

                fn project(slot: &$name) -> Option<&Self> {
                    match slot {
                        $name::$variant(ext) => Some(ext),
                        _ => None,
                    }
                }

                fn project_mut(slot: &mut $name) -> Option<&mut Self> {
                    match slot {
                        $name::$variant(ext) => Some(ext),
                        _ => None,
                    }
                }

                fn into_slot(self) -> $name {
                    $name::$variant(self)
                }

                fn from_slot(slot: $name) -> std::result::Result<Self, $name> {
                    match slot {
                        $name::$variant(ext) => Ok(ext),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

pub(crate) use extension_set;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::UnknownRecord;
    use psrstore_durability::Record;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Notes {
        text: String,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter {
        value: u32,
    }

    extension_set! {
        enum TestSlot {
            Notes(Notes),
            Counter(Counter),
        }
    }

    #[test]
    fn test_attach_replaces_same_kind() {
        let mut registry: Registry<TestSlot> = Registry::new();
        assert!(registry
            .attach(Notes {
                text: "first".into()
            })
            .is_none());
        registry.attach(Counter { value: 1 });

        let previous = registry.attach(Notes {
            text: "second".into(),
        });
        assert_eq!(previous.unwrap().text, "first");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find::<Notes>().unwrap().text, "second");
        assert_eq!(
            registry.tags(),
            vec![SlotTag::Known("Notes"), SlotTag::Known("Counter")]
        );
    }

    #[test]
    fn test_get_or_create_and_remove() {
        let mut registry: Registry<TestSlot> = Registry::new();
        assert!(!registry.contains::<Counter>());

        registry.get_or_create::<Counter>().value += 5;
        registry.get_or_create::<Counter>().value += 1;
        assert_eq!(registry.find::<Counter>().unwrap().value, 6);
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.remove::<Counter>(), Some(Counter { value: 6 }));
        assert!(registry.remove::<Counter>().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_slots_keyed_by_record_name() {
        let mut registry: Registry<TestSlot> = Registry::new();
        registry.attach_slot(TestSlot::Unknown(UnknownRecord::new(Record::new("BANDPASS"))));
        registry.attach_slot(TestSlot::Unknown(UnknownRecord::new(Record::new("COHDDISP"))));
        let replaced =
            registry.attach_slot(TestSlot::Unknown(UnknownRecord::new(Record::new("BANDPASS"))));

        assert!(replaced.is_some());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.tags()[1], SlotTag::Unknown("COHDDISP"));
        assert!(registry.find::<Notes>().is_none());
    }

    #[test]
    fn test_clone_is_deep() {
        let mut registry: Registry<TestSlot> = Registry::new();
        registry.attach(Counter { value: 3 });
        let mut copy = registry.clone();
        copy.find_mut::<Counter>().unwrap().value = 10;
        assert_eq!(registry.find::<Counter>().unwrap().value, 3);
    }
}
