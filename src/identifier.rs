//! Catalog entries are keyed by [`Id<T>`], a hash of the stable string id used in the data files.
//!
//! Equipment is authored as e.g. `"iron_ingot"` or `"sword_of_valor"`;
//! the resolver and the manifests only ever compare the hashed form.

use bevy::{prelude::Component, reflect::Reflect};
use serde::{Deserialize, Serialize};
use std::{fmt, hash::Hash, marker::PhantomData};

/// The identifier of a kind of catalog entry of type `T`.
///
/// Built from the entry's stable string id via [`Id::from_name`].
/// Two entries with the same string id always get the same [`Id`],
/// across runs and across catalog files.
///
/// [`Id`] is [`Copy`] and as cheap to compare as a `u64`, so recipes store
/// their component references as ids rather than strings.
#[derive(Component, Reflect, Serialize, Deserialize)]
pub struct Id<T> {
    /// Hash of the string id.
    value: u64,

    #[reflect(ignore)]
    #[serde(skip)]
    _phantom: PhantomData<T>,
}

/// Multiplier of the polynomial rolling hash.
///
/// A prime close to the size of the alphabet used in string ids.
const HASH_P: u64 = 53;

/// Modulus of the polynomial rolling hash.
///
/// A large prime keeps collisions between distinct string ids unlikely.
const HASH_M: u64 = 1_000_000_009;

impl<T> Id<T> {
    /// Hashes a stable string id into an [`Id`].
    ///
    /// # Example
    ///
    /// ```
    /// use equipment_manifest::identifier::Id;
    ///
    /// struct Equipment;
    ///
    /// const LEATHER: Id<Equipment> = Id::from_name("leather");
    ///
    /// assert_eq!(LEATHER, Id::from_name("leather"));
    /// assert_ne!(LEATHER, Id::from_name("iron"));
    /// ```
    pub const fn from_name(name: &str) -> Self {
        // See <https://cp-algorithms.com/string/string-hashing.html>
        let bytes = name.as_bytes();
        let mut value = 0;
        let mut p_pow = 1;
        let mut index = 0;

        // `for` loops are not allowed in const fns.
        while index < bytes.len() {
            value = (value + (bytes[index] as u64 + 1) * p_pow) % HASH_M;
            p_pow = (p_pow * HASH_P) % HASH_M;
            index += 1;
        }

        Id {
            value,
            _phantom: PhantomData,
        }
    }

    /// The raw hash value.
    pub const fn raw(&self) -> u64 {
        self.value
    }

    /// Reinterprets this id as the id of another entry type.
    ///
    /// Useful when a raw and a processed catalog entry share their string id.
    pub const fn cast<U>(self) -> Id<U> {
        Id {
            value: self.value,
            _phantom: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.value)
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;
    struct Other;

    #[test]
    fn empty_name_hashes_to_zero() {
        assert_eq!(Id::<Marker>::from_name("").raw(), 0);
    }

    #[test]
    fn hash_is_order_sensitive() {
        let ab: Id<Marker> = Id::from_name("ab");
        let ba: Id<Marker> = Id::from_name("ba");
        assert_ne!(ab, ba);
    }

    #[test]
    fn cast_keeps_the_value() {
        let id: Id<Marker> = Id::from_name("hilt");
        let cast: Id<Other> = id.cast();
        assert_eq!(id.raw(), cast.raw());
        assert_eq!(cast, Id::from_name("hilt"));
    }

    #[test]
    fn round_trips_through_ron() {
        let id: Id<Marker> = Id::from_name("iron");
        let text = ron::ser::to_string(&id).unwrap();
        let back: Id<Marker> = ron::de::from_str(&text).unwrap();
        assert_eq!(id, back);
    }
}
