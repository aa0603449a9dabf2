//! Hardware name pools
//!
//! A [`NamePool`] tracks one kind's hardware names. Every listed name is in
//! exactly one of `options` (free) or `assigned` (owned by an instance).

use std::collections::{BTreeMap, BTreeSet};

use super::BinderError;

/// Free and assigned names for one hardware kind
#[derive(Debug, Clone, Default)]
pub struct NamePool {
    /// `None` until the list component has published once
    listed: Option<BTreeSet<String>>,
    options: BTreeSet<String>,
    /// name -> owning instance id
    assigned: BTreeMap<String, String>,
}

impl NamePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the list component has been seen
    pub fn is_listed(&self) -> bool {
        self.listed.is_some()
    }

    /// Replace the published list. Returns `(name, owner)` for every
    /// assigned name that is no longer listed; those are dropped from the
    /// pool and their owners must unassign.
    pub fn sync(&mut self, names: impl IntoIterator<Item = String>) -> Vec<(String, String)> {
        let listed: BTreeSet<String> = names.into_iter().collect();

        let evicted: Vec<(String, String)> = self
            .assigned
            .iter()
            .filter(|(name, _)| !listed.contains(*name))
            .map(|(name, owner)| (name.clone(), owner.clone()))
            .collect();
        for (name, _) in &evicted {
            self.assigned.remove(name);
        }

        self.options = listed
            .iter()
            .filter(|n| !self.assigned.contains_key(*n))
            .cloned()
            .collect();
        self.listed = Some(listed);
        evicted
    }

    /// Move `name` from the options to `owner`.
    ///
    /// Before the first list arrives any name is accepted, so restored
    /// assignments survive start-up ordering.
    pub fn claim(&mut self, name: &str, owner: &str) -> Result<(), BinderError> {
        if let Some(current) = self.assigned.get(name) {
            if current == owner {
                return Ok(());
            }
            return Err(BinderError::NameTaken {
                name: name.to_string(),
                owner: current.clone(),
            });
        }
        if let Some(listed) = &self.listed {
            if !listed.contains(name) {
                return Err(BinderError::UnknownName(name.to_string()));
            }
        }

        self.options.remove(name);
        self.assigned.insert(name.to_string(), owner.to_string());
        Ok(())
    }

    /// Return `name` to the options if it is still listed
    pub fn release(&mut self, name: &str) {
        if self.assigned.remove(name).is_none() {
            return;
        }
        let still_listed = self
            .listed
            .as_ref()
            .map(|l| l.contains(name))
            .unwrap_or(true);
        if still_listed {
            self.options.insert(name.to_string());
        }
    }

    /// Free names, sorted
    pub fn options(&self) -> Vec<String> {
        self.options.iter().cloned().collect()
    }

    /// Assigned names, sorted
    pub fn assigned(&self) -> Vec<String> {
        self.assigned.keys().cloned().collect()
    }

    pub fn owner(&self, name: &str) -> Option<&str> {
        self.assigned.get(name).map(String::as_str)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn assert_partitioned(pool: &NamePool, listed: &[&str]) {
        let options = pool.options();
        let assigned = pool.assigned();
        for name in &options {
            assert!(!assigned.contains(name), "{} both free and assigned", name);
        }
        for name in listed {
            let free = options.iter().any(|o| o == name);
            let taken = assigned.iter().any(|a| a == name);
            assert!(free ^ taken, "{} must be in exactly one set", name);
        }
    }

    #[test]
    fn test_claim_and_release_keep_partition() {
        let listed = ["RELAY_1A_1", "RELAY_1A_0", "RELAY_1B_0"];
        let mut pool = NamePool::new();
        assert!(pool.sync(names(&listed)).is_empty());
        assert_eq!(pool.options(), names(&["RELAY_1A_0", "RELAY_1A_1", "RELAY_1B_0"]));

        pool.claim("RELAY_1A_1", "heater").unwrap();
        assert_partitioned(&pool, &listed);
        assert_eq!(pool.options(), names(&["RELAY_1A_0", "RELAY_1B_0"]));
        assert_eq!(pool.owner("RELAY_1A_1"), Some("heater"));

        pool.release("RELAY_1A_1");
        assert_partitioned(&pool, &listed);
        assert_eq!(pool.options(), names(&["RELAY_1A_0", "RELAY_1A_1", "RELAY_1B_0"]));
    }

    #[test]
    fn test_claim_conflicts() {
        let mut pool = NamePool::new();
        pool.sync(names(&["A", "B"]));
        pool.claim("A", "heater").unwrap();
        pool.claim("A", "heater").unwrap();

        assert!(matches!(
            pool.claim("A", "pump"),
            Err(BinderError::NameTaken { .. })
        ));
        assert!(matches!(
            pool.claim("Z", "pump"),
            Err(BinderError::UnknownName(_))
        ));
    }

    #[test]
    fn test_sync_evicts_removed_assignments() {
        let mut pool = NamePool::new();
        pool.sync(names(&["A", "B", "C"]));
        pool.claim("B", "heater").unwrap();

        let evicted = pool.sync(names(&["A", "C", "D"]));
        assert_eq!(evicted, vec![("B".to_string(), "heater".to_string())]);
        assert!(pool.assigned().is_empty());
        assert_eq!(pool.options(), names(&["A", "C", "D"]));
        assert_partitioned(&pool, &["A", "C", "D"]);
    }

    #[test]
    fn test_claim_before_first_list() {
        let mut pool = NamePool::new();
        assert!(!pool.is_listed());
        pool.claim("PROBE_0", "head").unwrap();

        assert!(pool.sync(names(&["PROBE_0", "PROBE_1"])).is_empty());
        assert_eq!(pool.options(), names(&["PROBE_1"]));
        assert_partitioned(&pool, &["PROBE_0", "PROBE_1"]);
    }

    #[test]
    fn test_release_unlisted_name_is_dropped() {
        let mut pool = NamePool::new();
        pool.claim("PROBE_0", "head").unwrap();
        pool.sync(names(&["PROBE_1"]));
        pool.release("PROBE_0");
        assert_eq!(pool.options(), names(&["PROBE_1"]));
    }
}
