use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::domain::{LeadId, ProfessionalId};

/// Per-lead and per-professional serialization points.
///
/// Ordering rule: a caller holds at most one lead lock, takes it before any professional lock,
/// and takes several professional locks in ascending id order.
#[derive(Debug, Default)]
pub struct LockRegistry {
    leads: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    professionals: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn lead(&self, id: &LeadId) -> Arc<Mutex<()>> {
        Self::slot(&self.leads, &id.0)
    }

    pub fn professional(&self, id: &ProfessionalId) -> Arc<Mutex<()>> {
        Self::slot(&self.professionals, &id.0)
    }

    /// Lock handles for several professionals, sorted and deduplicated.
    pub fn professionals<'a, I>(&self, ids: I) -> Vec<Arc<Mutex<()>>>
    where
        I: IntoIterator<Item = &'a ProfessionalId>,
    {
        let mut ids: Vec<&ProfessionalId> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        ids.into_iter().map(|id| self.professional(id)).collect()
    }

    /// Drops entries no caller holds a handle to and returns how many went.
    ///
    /// Handles are only cloned under the map lock, so an entry with no outside handle cannot
    /// gain one while it is being removed.
    pub fn prune(&self) -> usize {
        Self::prune_map(&self.leads) + Self::prune_map(&self.professionals)
    }

    pub fn len(&self) -> usize {
        Self::map_len(&self.leads) + Self::map_len(&self.professionals)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune_map(map: &Mutex<HashMap<String, Arc<Mutex<()>>>>) -> usize {
        let mut guard = map.lock().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - guard.len()
    }

    fn map_len(map: &Mutex<HashMap<String, Arc<Mutex<()>>>>) -> usize {
        map.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn slot(map: &Mutex<HashMap<String, Arc<Mutex<()>>>>, key: &str) -> Arc<Mutex<()>> {
        let mut guard = map.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// The guarded unit carries no data, so a poisoned lock is still safe to reuse.
pub(crate) fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}
