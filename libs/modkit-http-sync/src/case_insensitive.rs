//! Insertion-ordered map with case-insensitive string keys.
//!
//! Used for request/response headers and media type parameters, where
//! `Content-Type`, `content-type` and `CONTENT-TYPE` must address the same
//! slot while the casing a caller last used stays visible when iterating.

use indexmap::IndexMap;
use std::fmt;

/// Anything usable as a [`CaseInsensitiveMap`] key.
///
/// `None` addresses the single null-key slot.
pub trait MapKey {
    /// The key as it should be displayed, or `None` for the null-key slot
    fn as_key(&self) -> Option<&str>;
}

impl MapKey for str {
    fn as_key(&self) -> Option<&str> {
        Some(self)
    }
}

impl MapKey for &str {
    fn as_key(&self) -> Option<&str> {
        Some(*self)
    }
}

impl MapKey for String {
    fn as_key(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl MapKey for &String {
    fn as_key(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl MapKey for Option<&str> {
    fn as_key(&self) -> Option<&str> {
        *self
    }
}

impl MapKey for Option<String> {
    fn as_key(&self) -> Option<&str> {
        self.as_deref()
    }
}

/// ASCII-only lowercase fold used for hashing and equality.
///
/// Non-ASCII characters are compared exactly, so the result never depends
/// on Unicode case tables.
fn fold(key: Option<&str>) -> Option<String> {
    key.map(str::to_ascii_lowercase)
}

/// Map from optional string key to `V` that ignores key case.
///
/// Keys that differ only by case share one slot. The casing of the most
/// recent [`insert`](Self::insert) is the one reported by [`keys`](Self::keys)
/// and [`iter`](Self::iter). Iteration follows the order in which slots were
/// first created; overwriting an existing slot does not move it.
///
/// This is not a concurrent map; callers needing shared access must lock.
#[derive(Clone)]
pub struct CaseInsensitiveMap<V> {
    // folded key -> (display key, value)
    entries: IndexMap<Option<String>, (Option<String>, V)>,
}

impl<V> Default for CaseInsensitiveMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CaseInsensitiveMap<V> {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Create an empty map with room for `capacity` slots
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Number of slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the map holds no slots
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `value` under `key`, returning the value previously stored in
    /// the same case-insensitive slot.
    ///
    /// The slot keeps its position but adopts `key`'s casing.
    pub fn insert<K: MapKey + ?Sized>(&mut self, key: &K, value: V) -> Option<V> {
        let display = key.as_key().map(str::to_owned);
        let folded = fold(key.as_key());
        match self.entries.get_mut(&folded) {
            Some(slot) => {
                slot.0 = display;
                Some(std::mem::replace(&mut slot.1, value))
            }
            None => {
                self.entries.insert(folded, (display, value));
                None
            }
        }
    }

    /// Value stored under `key`, ignoring case
    #[must_use]
    pub fn get<K: MapKey + ?Sized>(&self, key: &K) -> Option<&V> {
        self.entries.get(&fold(key.as_key())).map(|(_, v)| v)
    }

    /// Mutable value stored under `key`, ignoring case
    pub fn get_mut<K: MapKey + ?Sized>(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(&fold(key.as_key())).map(|(_, v)| v)
    }

    /// Display key and value stored under `key`, ignoring case
    #[must_use]
    pub fn get_key_value<K: MapKey + ?Sized>(&self, key: &K) -> Option<(Option<&str>, &V)> {
        self.entries
            .get(&fold(key.as_key()))
            .map(|(k, v)| (k.as_deref(), v))
    }

    /// Value stored under `key`, or `default` when the slot is absent
    #[must_use]
    pub fn get_or<'a, K: MapKey + ?Sized>(&'a self, key: &K, default: &'a V) -> &'a V {
        self.get(key).unwrap_or(default)
    }

    /// `true` if a slot exists for `key`, ignoring case
    #[must_use]
    pub fn contains_key<K: MapKey + ?Sized>(&self, key: &K) -> bool {
        self.entries.contains_key(&fold(key.as_key()))
    }

    /// Remove the slot for `key`, returning its value.
    ///
    /// Remaining slots keep their relative order.
    pub fn remove<K: MapKey + ?Sized>(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Remove the slot for `key`, returning its display key and value
    pub fn remove_entry<K: MapKey + ?Sized>(
        &mut self,
        key: &K,
    ) -> Option<(Option<String>, V)> {
        self.entries.shift_remove(&fold(key.as_key()))
    }

    /// Return the value for `key`, inserting the result of `f` first if the
    /// slot is absent.
    ///
    /// An existing slot keeps its display casing.
    pub fn entry_or_insert_with<K: MapKey + ?Sized>(
        &mut self,
        key: &K,
        f: impl FnOnce() -> V,
    ) -> &mut V {
        let display = key.as_key().map(str::to_owned);
        let folded = fold(key.as_key());
        &mut self.entries.entry(folded).or_insert_with(|| (display, f())).1
    }

    /// Keep only the slots for which `keep` returns `true`
    pub fn retain(&mut self, mut keep: impl FnMut(Option<&str>, &mut V) -> bool) {
        self.entries.retain(|_, (k, v)| keep(k.as_deref(), v));
    }

    /// Remove every slot
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove every slot, yielding display keys and values in order
    pub fn drain(&mut self) -> impl Iterator<Item = (Option<String>, V)> + '_ {
        self.entries.drain(..).map(|(_, entry)| entry)
    }

    /// Display keys and values in slot order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Option<&str>, &V)> + ExactSizeIterator {
        self.entries.values().map(|(k, v)| (k.as_deref(), v))
    }

    /// Display keys and mutable values in slot order
    pub fn iter_mut(
        &mut self,
    ) -> impl DoubleEndedIterator<Item = (Option<&str>, &mut V)> + ExactSizeIterator {
        self.entries.values_mut().map(|(k, v)| (k.as_deref(), v))
    }

    /// Display keys in slot order
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = Option<&str>> + ExactSizeIterator {
        self.entries.values().map(|(k, _)| k.as_deref())
    }

    /// Values in slot order
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> + ExactSizeIterator {
        self.entries.values().map(|(_, v)| v)
    }

    /// Mutable values in slot order
    pub fn values_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut V> + ExactSizeIterator {
        self.entries.values_mut().map(|(_, v)| v)
    }
}

impl<V: fmt::Debug> fmt::Debug for CaseInsensitiveMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Two maps are equal when they hold the same case-insensitive slots with
/// equal values; order and display casing are ignored.
impl<V: PartialEq> PartialEq for CaseInsensitiveMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(folded, (_, v))| other.entries.get(folded).is_some_and(|(_, o)| o == v))
    }
}

impl<V: Eq> Eq for CaseInsensitiveMap<V> {}

impl<K: MapKey, V> FromIterator<(K, V)> for CaseInsensitiveMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: MapKey, V> Extend<(K, V)> for CaseInsensitiveMap<V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(&k, v);
        }
    }
}

impl<V> IntoIterator for CaseInsensitiveMap<V> {
    type Item = (Option<String>, V);
    type IntoIter = indexmap::map::IntoValues<Option<String>, (Option<String>, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}
