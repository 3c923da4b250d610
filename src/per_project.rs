//! Immutable per-project accumulation of item sets.
//!
//! A [`PerProject`] maps each [`GroupAndName`] to a set of items. It is never
//! modified in place: [`PerProject::merge`] returns a new accumulator whose set
//! for the merged key is the union of the old set and the new items. Sets for
//! untouched keys are shared between the old and new values.
//!
//! A key with no items and a key that was never recorded are the same thing.
//! Empty sets are dropped on every construction path so equality and
//! serialization never see the difference.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::key::GroupAndName;

/// Immutable map from project key to the set of items recorded for it.
///
/// Cloning is cheap; clones share the underlying map.
pub struct PerProject<T> {
    items: Arc<HashMap<GroupAndName, Arc<HashSet<T>>>>,
}

impl<T> PerProject<T> {
    /// The accumulator with no keys.
    pub fn empty() -> Self {
        Self {
            items: Arc::new(HashMap::new()),
        }
    }

    /// Start building an accumulator from a full replacement mapping.
    pub fn builder() -> PerProjectBuilder<T> {
        PerProjectBuilder::new()
    }

    /// Number of keys with at least one item.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keys with at least one item, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &GroupAndName> + '_ {
        self.items.keys()
    }

    /// Every (key, item) pair, in no particular order.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a GroupAndName, &'a T)> + 'a {
        self.items
            .iter()
            .flat_map(|(key, set)| set.iter().map(move |item| (key, item)))
    }

    /// Apply `flattener` to every (key, item) pair.
    ///
    /// The returned iterator is lazy. Each call starts a fresh pass, and every
    /// pair is visited exactly once per pass. Order is unspecified.
    pub fn flatten<'a, R, F>(&'a self, mut flattener: F) -> impl Iterator<Item = R> + 'a
    where
        F: FnMut(&GroupAndName, &T) -> R + 'a,
        R: 'a,
    {
        self.iter().map(move |(key, item)| flattener(key, item))
    }
}

impl<T: Clone> PerProject<T> {
    /// Items recorded for `key`, or the empty set if none were.
    pub fn for_key(&self, key: &GroupAndName) -> Cow<'_, HashSet<T>> {
        match self.items.get(key) {
            Some(set) => Cow::Borrowed(set.as_ref()),
            None => Cow::Owned(HashSet::new()),
        }
    }

    /// Copy out the entire state as a single map value.
    pub fn to_map(&self) -> HashMap<GroupAndName, HashSet<T>> {
        self.items
            .iter()
            .map(|(key, set)| (key.clone(), set.as_ref().clone()))
            .collect()
    }
}

impl<T: Eq + Hash> PerProject<T> {
    /// Whether `item` has been recorded for `key`.
    pub fn contains(&self, key: &GroupAndName, item: &T) -> bool {
        self.items
            .get(key)
            .map(|set| set.contains(item))
            .unwrap_or(false)
    }
}

impl<T: Eq + Hash + Clone> PerProject<T> {
    /// Record `new_items` for `key`, keeping everything already recorded.
    ///
    /// Returns a new accumulator; `self` is left untouched. When nothing new
    /// is added the result shares all of its state with `self`.
    pub fn merge<I>(&self, key: &GroupAndName, new_items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut union: HashSet<T> = self
            .items
            .get(key)
            .map(|set| set.as_ref().clone())
            .unwrap_or_default();
        let before = union.len();
        union.extend(new_items);

        if union.len() == before {
            tracing::trace!("merge into {} added no new items", key);
            return self.clone();
        }

        tracing::debug!(
            "merge into {} added {} item(s), {} total",
            key,
            union.len() - before,
            union.len()
        );

        let mut items = self.items.as_ref().clone();
        items.insert(key.clone(), Arc::new(union));
        Self {
            items: Arc::new(items),
        }
    }
}

impl<T> Clone for PerProject<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for PerProject<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Eq + Hash> PartialEq for PerProject<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.items, &other.items) || self.items == other.items
    }
}

impl<T: Eq + Hash> Eq for PerProject<T> {}

impl<T: fmt::Debug> fmt::Debug for PerProject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.items.iter().map(|(key, set)| (key, set.as_ref())))
            .finish()
    }
}

impl<T: Eq + Hash> FromIterator<(GroupAndName, T)> for PerProject<T> {
    fn from_iter<I: IntoIterator<Item = (GroupAndName, T)>>(iter: I) -> Self {
        let mut grouped: HashMap<GroupAndName, HashSet<T>> = HashMap::new();
        for (key, item) in iter {
            grouped.entry(key).or_default().insert(item);
        }
        PerProject::builder().put_all(grouped).build()
    }
}

// Keys and items are written in sorted order so persisted files diff cleanly.
impl<T: Serialize + Ord> Serialize for PerProject<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sorted: BTreeMap<&GroupAndName, BTreeSet<&T>> = self
            .items
            .iter()
            .map(|(key, set)| (key, set.iter().collect()))
            .collect();
        sorted.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for PerProject<T>
where
    T: Deserialize<'de> + Eq + Hash,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = HashMap::<GroupAndName, HashSet<T>>::deserialize(deserializer)?;
        Ok(PerProject::builder().put_all(items).build())
    }
}

/// Builder for [`PerProject`].
///
/// Inputs are taken by value, so nothing the caller holds can alias the
/// built accumulator.
pub struct PerProjectBuilder<T> {
    items: HashMap<GroupAndName, HashSet<T>>,
}

impl<T> PerProjectBuilder<T> {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }
}

impl<T> Default for PerProjectBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash> PerProjectBuilder<T> {
    /// Set the items for `key`, replacing any earlier `put` for the same key.
    pub fn put<I>(mut self, key: GroupAndName, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        self.items.insert(key, items.into_iter().collect());
        self
    }

    /// Set the items for every key in `items`.
    pub fn put_all<I>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = (GroupAndName, HashSet<T>)>,
    {
        self.items.extend(items);
        self
    }

    /// Freeze the mapping. Keys mapped to an empty set are dropped.
    pub fn build(self) -> PerProject<T> {
        let items: HashMap<GroupAndName, Arc<HashSet<T>>> = self
            .items
            .into_iter()
            .filter_map(|(key, set)| {
                if set.is_empty() {
                    tracing::trace!("dropping empty item set for {}", key);
                    None
                } else {
                    Some((key, Arc::new(set)))
                }
            })
            .collect();

        PerProject {
            items: Arc::new(items),
        }
    }
}
