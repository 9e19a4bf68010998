//! Per-service client cache.
//!
//! One client per service name. Concurrent first requests for the same
//! service share a single pending creation; a change of AWS profile or
//! region drops every cached client.

use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::debug;

type Slot<C> = Arc<OnceCell<Arc<C>>>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct CredentialKey {
    profile: Option<String>,
    region: Option<String>,
}

pub struct ClientCache<C> {
    clients: Mutex<HashMap<String, Slot<C>>>,
    key: Mutex<CredentialKey>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<C> ClientCache<C> {
    pub fn new(profile: Option<&str>, region: Option<&str>) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            key: Mutex::new(CredentialKey {
                profile: profile.map(str::to_string),
                region: region.map(str::to_string),
            }),
        }
    }

    /// Cached client for `service`, created with `factory` on first use.
    /// A failed creation is not cached; the next caller tries again.
    pub async fn get_client<F, Fut>(&self, service: &str, factory: F) -> Result<Arc<C>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C>>,
    {
        let slot = {
            let mut clients = lock(&self.clients);
            clients
                .entry(service.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let client = slot
            .get_or_try_init(move || async move {
                debug!("Creating client for service '{}'", service);
                factory().await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(client))
    }

    /// Drop all clients if the profile or region differs from the one they
    /// were built for. Returns true when the cache was cleared.
    pub fn invalidate_if_changed(&self, profile: Option<&str>, region: Option<&str>) -> bool {
        let next = CredentialKey {
            profile: profile.map(str::to_string),
            region: region.map(str::to_string),
        };
        let mut key = lock(&self.key);
        if *key == next {
            return false;
        }
        debug!(
            "Credentials changed ({:?}/{:?} -> {:?}/{:?}); clearing client cache",
            key.profile, key.region, next.profile, next.region
        );
        *key = next;
        self.clear();
        true
    }

    pub fn clear(&self) {
        lock(&self.clients).clear();
    }

    /// Number of services with a slot (pending or ready)
    pub fn len(&self) -> usize {
        lock(&self.clients).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
