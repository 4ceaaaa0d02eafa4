//! Generic classification of cloud items against a local index.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Cloud items split by what the store needs to do with them.
#[derive(Debug)]
pub struct Diff<'a, I, R> {
    pub create: Vec<&'a I>,
    pub update: Vec<(&'a I, &'a R)>,
    pub unchanged: Vec<(&'a I, &'a R)>,
}

/// Classify `items` against `index`.
///
/// Items missing from the index are creates; present ones are updates when
/// `is_updated` says so. Repeated keys keep their first occurrence only.
pub fn diff<'a, I, R, K, F, U>(
    items: &'a [I],
    index: &'a HashMap<K, R>,
    key: F,
    is_updated: U,
) -> Diff<'a, I, R>
where
    K: Eq + Hash,
    F: Fn(&I) -> K,
    U: Fn(&I, &R) -> bool,
{
    let mut seen = HashSet::with_capacity(items.len());
    let mut out = Diff {
        create: Vec::new(),
        update: Vec::new(),
        unchanged: Vec::new(),
    };

    for item in items {
        let k = key(item);
        let Some(record) = index.get(&k) else {
            if seen.insert(k) {
                out.create.push(item);
            }
            continue;
        };
        if !seen.insert(k) {
            continue;
        }
        if is_updated(item, record) {
            out.update.push((item, record));
        } else {
            out.unchanged.push((item, record));
        }
    }
    out
}

/// Records in `index` whose key was not observed.
pub fn missing<'a, K, R>(index: &'a HashMap<K, R>, observed: &HashSet<K>) -> Vec<&'a R>
where
    K: Eq + Hash,
{
    index
        .iter()
        .filter(|(k, _)| !observed.contains(*k))
        .map(|(_, r)| r)
        .collect()
}
