use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// LockNames is the normalized name set of one call: sorted and de-duplicated. The sort order is
/// also the claim order, so concurrent multi-name attempts can't deadlock each other.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct LockNames(Vec<String>);

impl LockNames {
    pub(crate) fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl From<&[&str]> for LockNames {
    fn from(names: &[&str]) -> Self {
        LockNames::from(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
    }
}

impl From<Vec<String>> for LockNames {
    fn from(mut names: Vec<String>) -> Self {
        names.sort();
        names.dedup();
        LockNames(names)
    }
}

/// LockRecord exists exactly as long as its lock is held.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockRecord<O> {
    pub owner: O,
    pub granted_at: DateTime<Utc>,
}

impl<O> LockRecord<O> {
    pub(crate) fn granted_now(owner: O) -> Self {
        LockRecord {
            owner,
            granted_at: Utc::now(),
        }
    }
}

/// LockTable maps each held name to its single record.
pub(crate) struct LockTable<O> {
    records: HashMap<String, LockRecord<O>>,
}

impl<O: Clone + Eq> LockTable<O> {
    pub(crate) fn new() -> Self {
        LockTable {
            records: HashMap::new(),
        }
    }

    pub(crate) fn record(&self, name: &str) -> Option<&LockRecord<O>> {
        self.records.get(name)
    }

    pub(crate) fn owner_of(&self, name: &str) -> Option<&O> {
        self.records.get(name).map(|r| &r.owner)
    }

    pub(crate) fn holds_all(&self, names: &LockNames, owner: &O) -> bool {
        names.iter().all(|n| self.owner_of(n) == Some(owner))
    }

    pub(crate) fn conflicts(&self, names: &LockNames, owner: &O) -> Vec<String> {
        names
            .iter()
            .filter(|n| matches!(self.owner_of(n), Some(o) if o != owner))
            .cloned()
            .collect()
    }

    /// Claims every name in order. On success returns the names that weren't already held by
    /// `owner`. On the first conflict, drops the claims this call made and returns the names held
    /// by others.
    pub(crate) fn try_acquire_all(&mut self, names: &LockNames, owner: &O) -> Result<Vec<String>, Vec<String>> {
        let mut claimed: Vec<String> = Vec::new();
        for name in names.iter() {
            match self.records.get(name) {
                Some(record) if &record.owner == owner => {}
                Some(_) => {
                    for name in claimed.iter() {
                        self.records.remove(name);
                    }
                    return Err(self.conflicts(names, owner));
                }
                None => {
                    self.records
                        .insert(name.clone(), LockRecord::granted_now(owner.clone()));
                    claimed.push(name.clone());
                }
            }
        }

        Ok(claimed)
    }

    /// Inserts `record` unless `name` is held by somebody else. Returns false on conflict.
    pub(crate) fn insert_unless_held(&mut self, name: String, record: LockRecord<O>) -> bool {
        match self.records.get(&name) {
            Some(existing) if existing.owner != record.owner => false,
            Some(_) => true,
            None => {
                self.records.insert(name, record);
                true
            }
        }
    }

    /// Removes the records of `names` owned by `owner`. Returns the removed names.
    pub(crate) fn release<'a>(&mut self, names: impl IntoIterator<Item = &'a String>, owner: &O) -> Vec<String> {
        let mut released = Vec::new();
        for name in names {
            if self.owner_of(name) == Some(owner) {
                self.records.remove(name);
                released.push(name.clone());
            }
        }
        released
    }

    /// Removes every record whose owner matches, returning the removed names with their owner.
    pub(crate) fn release_where(&mut self, predicate: impl Fn(&O) -> bool) -> Vec<(String, O)> {
        let doomed: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| predicate(&r.owner))
            .map(|(n, _)| n.clone())
            .collect();

        doomed
            .into_iter()
            .filter_map(|name| self.records.remove(&name).map(|r| (name, r.owner)))
            .collect()
    }

    pub(crate) fn names_held_by(&self, owner: &O) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| &r.owner == owner)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn snapshot(&self) -> Vec<(String, LockRecord<O>)> {
        let mut records: Vec<(String, LockRecord<O>)> =
            self.records.iter().map(|(n, r)| (n.clone(), r.clone())).collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }

    pub(crate) fn replace_all(&mut self, records: impl IntoIterator<Item = (String, LockRecord<O>)>) {
        self.records = records.into_iter().collect();
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
