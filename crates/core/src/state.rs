use std::collections::HashMap;

use aika_lib::{search::wildcard_regex, Error, Result, StateSet};
use parking_lot::RwLock;

/// Instance-scoped registry of state sets, keyed case-insensitively by
/// name. Created at historian construction; never process-wide.
#[derive(Default)]
pub struct StateSetRegistry {
    sets: RwLock<HashMap<String, StateSet>>,
}

impl StateSetRegistry {
    pub fn new() -> Self {
        StateSetRegistry::default()
    }

    pub fn get(&self, name: &str) -> Option<StateSet> {
        self.sets.read().get(&key(name)).cloned()
    }

    /// State sets whose name matches the wildcard pattern, name-sorted.
    pub fn find(&self, pattern: &str) -> Result<Vec<StateSet>> {
        let regex = wildcard_regex(pattern)?;
        let sets = self.sets.read();
        let mut found: Vec<StateSet> = sets
            .values()
            .filter(|s| regex.is_match(s.name()))
            .cloned()
            .collect();
        found.sort_by(|a, b| key(a.name()).cmp(&key(b.name())));
        Ok(found)
    }

    pub fn create(&self, set: StateSet) -> Result<StateSet> {
        let mut sets = self.sets.write();
        let k = key(set.name());
        if sets.contains_key(&k) {
            return Err(Error::invalid(format!(
                "state set `{}` already exists",
                set.name()
            )));
        }
        sets.insert(k, set.clone());
        Ok(set)
    }

    /// Replaces an existing set wholesale; state sets are immutable values.
    pub fn update(&self, set: StateSet) -> Result<StateSet> {
        let mut sets = self.sets.write();
        let k = key(set.name());
        if !sets.contains_key(&k) {
            return Err(Error::not_found(format!("state set `{}`", set.name())));
        }
        sets.insert(k, set.clone());
        Ok(set)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        match self.sets.write().remove(&key(name)) {
            Some(_) => Ok(()),
            None => Err(Error::not_found(format!("state set `{name}`"))),
        }
    }
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}
