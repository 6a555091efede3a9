use std::collections::BTreeMap;

use folio_store::{ExistingKeys, KeyEntry};
use folio_types::natural_cmp;

use crate::object::{FlexObject, ObjectKind};

/// Ordered projection of a storage's existing keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyIndex {
    order: Vec<String>,
    entries: ExistingKeys,
}

impl KeyIndex {
    /// Order `keys` for `kind`.
    ///
    /// Generic objects follow key order. Pages follow their storage keys
    /// (folder order prefixes) under manual ordering and their routes
    /// otherwise; both compare naturally.
    pub fn new(entries: ExistingKeys, kind: ObjectKind, manual_order: bool) -> Self {
        let mut order: Vec<String> = entries.keys().cloned().collect();
        if kind == ObjectKind::Page {
            if manual_order {
                order.sort_by(|a, b| {
                    natural_cmp(&entries[a].storage_key, &entries[b].storage_key)
                        .then_with(|| a.cmp(b))
                });
            } else {
                order.sort_by(|a, b| natural_cmp(a, b).then_with(|| a.cmp(b)));
            }
        }
        Self { order, entries }
    }

    pub fn get(&self, key: &str) -> Option<&KeyEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys in collection order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    /// Entries in collection order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyEntry)> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).map(|entry| (key.as_str(), entry)))
    }

    /// The entries of `keys` that exist, in the order given.
    pub fn select<I, S>(&self, keys: I) -> Vec<(String, KeyEntry)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .filter_map(|key| {
                let key = key.as_ref();
                self.entries
                    .get(key)
                    .map(|entry| (key.to_string(), entry.clone()))
            })
            .collect()
    }

    /// Every entry in collection order.
    pub fn to_entries(&self) -> Vec<(String, KeyEntry)> {
        self.iter()
            .map(|(key, entry)| (key.to_string(), entry.clone()))
            .collect()
    }

    pub fn existing_keys(&self) -> &ExistingKeys {
        &self.entries
    }
}

/// Loaded objects in index order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlexCollection {
    objects: Vec<FlexObject>,
    positions: BTreeMap<String, usize>,
}

impl FlexCollection {
    pub fn new(objects: Vec<FlexObject>) -> Self {
        let positions = objects
            .iter()
            .enumerate()
            .map(|(i, object)| (object.key().to_string(), i))
            .collect();
        Self { objects, positions }
    }

    pub fn get(&self, key: &str) -> Option<&FlexObject> {
        self.positions.get(key).map(|&i| &self.objects[i])
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.objects.iter().map(FlexObject::key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FlexObject> {
        self.objects.iter()
    }

    pub fn into_vec(self) -> Vec<FlexObject> {
        self.objects
    }
}

impl IntoIterator for FlexCollection {
    type Item = FlexObject;
    type IntoIter = std::vec::IntoIter<FlexObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.into_iter()
    }
}

impl<'a> IntoIterator for &'a FlexCollection {
    type Item = &'a FlexObject;
    type IntoIter = std::slice::Iter<'a, FlexObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}
