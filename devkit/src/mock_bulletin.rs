/*!
Mock BulletinSource pour tester le mode météo sans la page BMKG

Bulletin scripté (succès ou échec), latence optionnelle, compteur d'appels.
*/

use async_trait::async_trait;
use lalin_server::{Bulletin, BulletinSource, ProviderError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct MockBulletin {
    scripted: Arc<Mutex<Result<Bulletin, String>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    fetches: Arc<AtomicUsize>,
}

impl MockBulletin {
    pub fn new() -> Self {
        Self {
            scripted: Arc::new(Mutex::new(Err("no bulletin scripted".into()))),
            delay: Arc::new(Mutex::new(None)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_bulletin(&self, bulletin: Bulletin) {
        *self.scripted.lock() = Ok(bulletin);
    }

    pub fn set_failure(&self, cause: &str) {
        *self.scripted.lock() = Err(cause.to_string());
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for MockBulletin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BulletinSource for MockBulletin {
    async fn fetch_bulletin(&self) -> Result<Bulletin, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.scripted.lock().clone().map_err(ProviderError::Upstream)
    }
}
