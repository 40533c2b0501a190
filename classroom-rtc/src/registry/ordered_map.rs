/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// HashMap whose keys are also kept sorted, so remote participants render in a
/// stable order regardless of the order their tracks arrived in.
#[derive(Debug, Clone)]
pub struct OrderedMap<K, V> {
    map: HashMap<K, V>,
    keys: Vec<K>,
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            keys: vec![],
        }
    }
}

impl<K: Clone + Eq + Hash + Ord, V> OrderedMap<K, V> {
    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(k)
    }

    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(k)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Inserts or replaces; returns the replaced value.
    pub fn insert(&mut self, k: K, v: V) -> Option<V> {
        let previous = self.map.insert(k.clone(), v);
        if previous.is_none() {
            if let Err(index) = self.keys.binary_search(&k) {
                self.keys.insert(index, k);
            }
        }
        previous
    }

    pub fn remove<Q>(&mut self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Ord + ?Sized,
    {
        let removed = self.map.remove(k);
        if removed.is_some() {
            let found = self.keys.binary_search_by(|probe| {
                let probe: &Q = probe.borrow();
                probe.cmp(k)
            });
            if let Ok(index) = found {
                self.keys.remove(index);
            }
        }
        removed
    }

    pub fn ordered_keys(&self) -> &[K] {
        &self.keys
    }

    /// Values in key order.
    pub fn ordered_values(&self) -> impl Iterator<Item = &V> {
        self.keys.iter().filter_map(|k| self.map.get(k))
    }
}
