/**
 * CLIENT REGISTRY - Ensemble des abonnés UDP du serveur
 *
 * RÔLE : Mémorise les endpoints qui reçoivent les broadcasts.
 * Un endpoint entre au premier datagramme valide et ne sort que sur échec
 * d'envoi (ou après inactivité si l'éviction est activée).
 *
 * ARCHITECTURE : HashMap<endpoint, last_seen> sous un seul mutex parking_lot.
 * Aucune opération ne garde le verrou pendant une I/O réseau : les boucles
 * itèrent sur `snapshot()`.
 */

use crate::models::ClientEndpoint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<Mutex<HashMap<ClientEndpoint, Instant>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insertion idempotente. Retourne `true` si l'endpoint est nouveau.
    /// Un endpoint déjà connu voit seulement son `last_seen` rafraîchi.
    pub fn add(&self, endpoint: ClientEndpoint) -> bool {
        let mut clients = self.clients.lock();
        let is_new = clients.insert(endpoint, Instant::now()).is_none();
        if is_new {
            info!(client = %endpoint, total = clients.len(), "new subscriber registered");
        }
        is_new
    }

    /// Suppression idempotente. Retourne `true` si l'endpoint était présent.
    pub fn remove(&self, endpoint: &ClientEndpoint) -> bool {
        let removed = self.clients.lock().remove(endpoint).is_some();
        if removed {
            info!(client = %endpoint, "subscriber removed");
        }
        removed
    }

    /// Copie indépendante des membres, à itérer hors verrou.
    pub fn snapshot(&self) -> Vec<ClientEndpoint> {
        self.clients.lock().keys().copied().collect()
    }

    pub fn contains(&self, endpoint: &ClientEndpoint) -> bool {
        self.clients.lock().contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Retire les endpoints silencieux depuis plus de `max_idle`.
    /// Retourne les endpoints évincés.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<ClientEndpoint> {
        let now = Instant::now();
        let mut evicted = Vec::new();
        self.clients.lock().retain(|endpoint, last_seen| {
            if now.duration_since(*last_seen) > max_idle {
                evicted.push(*endpoint);
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Balayage périodique des abonnés inactifs, jusqu'au signal d'arrêt.
    pub fn spawn_idle_eviction(
        &self,
        max_idle: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        let period = max_idle.min(Duration::from_secs(60));
        info!("starting idle eviction (timeout: {}s)", max_idle.as_secs());

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // le premier tick est immédiat
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        for endpoint in registry.evict_idle(max_idle) {
                            info!(client = %endpoint, "evicted idle subscriber");
                        }
                    }
                    _ = shutdown.changed() => {
                        debug!("idle eviction stopped");
                        break;
                    }
                }
            }
        })
    }
}
