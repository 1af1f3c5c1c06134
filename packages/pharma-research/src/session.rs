//! In-process store of recent run results, keyed by session identifier.
//!
//! Callers fetch a finished run's results (for exports or log retrieval)
//! by the opaque `session_id` in the response. The store is bounded:
//! when full, the least-recently-touched session is evicted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use uuid::Uuid;

use crate::response::ResearchResponse;

struct Entry {
    response: ResearchResponse,
    last_touched: Instant,
}

/// Bounded session store with last-touched eviction.
pub struct SessionStore {
    capacity: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store a finished run and return its fresh session id.
    pub fn insert(&self, mut response: ResearchResponse) -> String {
        let session_id = format!("search_{}", Uuid::new_v4().simple());
        response.session_id = session_id.clone();
        let mut entries = self.entries.lock().expect("session store lock");

        if entries.len() >= self.capacity {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_touched)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            session_id.clone(),
            Entry {
                response,
                last_touched: Instant::now(),
            },
        );
        session_id
    }

    /// Fetch a session's results, refreshing its eviction clock.
    pub fn get(&self, session_id: &str) -> Option<ResearchResponse> {
        let mut entries = self.entries.lock().expect("session store lock");
        let entry = entries.get_mut(session_id)?;
        entry.last_touched = Instant::now();
        Some(entry.response.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("session store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunStats;

    fn response() -> ResearchResponse {
        ResearchResponse {
            success: true,
            results: vec![],
            workflow_stats: RunStats::default(),
            session_id: String::new(),
            error: None,
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let store = SessionStore::new(5);
        let id = store.insert(response());
        assert!(store.get(&id).is_some());
        assert!(store.get("search_missing").is_none());
    }

    #[test]
    fn ids_are_unique() {
        let store = SessionStore::new(5);
        let a = store.insert(response());
        let b = store.insert(response());
        assert_ne!(a, b);
    }

    #[test]
    fn capacity_evicts_least_recently_touched() {
        let store = SessionStore::new(2);
        let first = store.insert(response());
        let second = store.insert(response());

        // Touch the first so the second becomes the eviction candidate
        assert!(store.get(&first).is_some());
        let third = store.insert(response());

        assert_eq!(store.len(), 2);
        assert!(store.get(&first).is_some());
        assert!(store.get(&second).is_none());
        assert!(store.get(&third).is_some());
    }
}
