/*!
Mock DataProvider pour tests sans API TomTom

Géocodage par table, relevé scripté (succès ou échec), latence optionnelle
pour tester les timeouts, et compteurs d'appels pour les assertions.
*/

use async_trait::async_trait;
use chrono::Local;
use lalin_server::{Coordinates, DataProvider, ProviderError, TrafficReading};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
enum Scripted {
    Reading(TrafficReading),
    Failure(String),
}

#[derive(Clone)]
pub struct MockProvider {
    locations: Arc<Mutex<HashMap<String, Coordinates>>>,
    reading: Arc<Mutex<Scripted>>,
    delay: Arc<Mutex<Option<Duration>>>,
    fetched: Arc<Mutex<Vec<Coordinates>>>,
    lookups: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            locations: Arc::new(Mutex::new(HashMap::new())),
            reading: Arc::new(Mutex::new(Scripted::Failure("no reading scripted".into()))),
            delay: Arc::new(Mutex::new(None)),
            fetched: Arc::new(Mutex::new(Vec::new())),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Rend `name` résolvable (comparaison insensible à la casse).
    pub fn with_location(self, name: &str, latitude: f64, longitude: f64) -> Self {
        self.locations
            .lock()
            .insert(name.to_lowercase(), Coordinates::new(latitude, longitude));
        self
    }

    pub fn set_reading(&self, reading: TrafficReading) {
        *self.reading.lock() = Scripted::Reading(reading);
    }

    pub fn set_failure(&self, cause: &str) {
        *self.reading.lock() = Scripted::Failure(cause.to_string());
    }

    /// Chaque appel attend `delay` avant de répondre.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().len()
    }

    pub fn fetched_coordinates(&self) -> Vec<Coordinates> {
        self.fetched.lock().clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Relevé type : vitesse 20/40 km/h, 50 % de congestion, confidence 0.9.
pub fn sample_reading(place: &str) -> TrafficReading {
    TrafficReading {
        timestamp: Local::now(),
        place_name: place.to_string(),
        current_speed: 20,
        free_flow_speed: 40,
        congestion_percent: 50.0,
        confidence: 0.9,
    }
}

#[async_trait]
impl DataProvider for MockProvider {
    async fn resolve_location(&self, text: &str) -> Result<Coordinates, ProviderError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.locations
            .lock()
            .get(&text.to_lowercase())
            .copied()
            .ok_or_else(|| ProviderError::NotFound(text.to_string()))
    }

    async fn fetch_reading(&self, coords: Coordinates) -> Result<TrafficReading, ProviderError> {
        self.fetched.lock().push(coords);
        self.simulate_latency().await;
        let scripted = self.reading.lock().clone();
        match scripted {
            Scripted::Reading(reading) => Ok(reading),
            Scripted::Failure(cause) => Err(ProviderError::Upstream(cause)),
        }
    }
}
