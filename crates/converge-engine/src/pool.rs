//! Lazily constructed, shared API clients

use crate::error::Result;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

type Factory<K, C> = Box<dyn Fn(&K) -> Result<C> + Send + Sync>;

/// One API client per service key, built on first use and reused after.
///
/// The pool's lock covers only the check-and-construct step. Callers get an
/// `Arc` to the client and make their calls without holding it, so
/// concurrent reconciliations only serialize on first-time setup.
pub struct ClientPool<K, C> {
    clients: Mutex<HashMap<K, Arc<C>>>,
    factory: Factory<K, C>,
}

impl<K, C> ClientPool<K, C>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new(factory: impl Fn(&K) -> Result<C> + Send + Sync + 'static) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Get the client for `key`, constructing it if this is the first use
    pub fn get(&self, key: &K) -> Result<Arc<C>> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(key) {
            return Ok(Arc::clone(client));
        }

        tracing::debug!("Constructing API client for {:?}", key);
        let client = Arc::new((self.factory)(key)?);
        clients.insert(key.clone(), Arc::clone(&client));
        Ok(client)
    }

    /// Number of clients constructed so far
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
