/**
 * BROADCAST LOOP - Fetch périodique + diffusion à tous les abonnés
 *
 * RÔLE : À chaque tick, snapshot de la cible ; si idle on ne fait rien
 * (ni appel réseau ni envoi). Sinon un appel provider borné par timeout,
 * puis une ligne (statut ou échec) envoyée à chaque abonné.
 *
 * Si la cible a changé (SEARCH/RESET) pendant l'appel provider, la ligne
 * du cycle est abandonnée : elle ne suivra pas la confirmation [SERVER].
 *
 * MODE MÉTÉO : même boucle, sans cible ; le bulletin BMKG est fetché et
 * diffusé à chaque tick.
 *
 * ISOLATION : un envoi qui échoue évince uniquement cet abonné, les autres
 * reçoivent quand même le message du cycle. Pas de retry provider dans un
 * cycle : le tick suivant est la nouvelle tentative.
 */

use crate::models::ClientEndpoint;
use crate::monitor::MonitorState;
use crate::protocol;
use crate::provider::{bounded, DataProvider};
use crate::registry::ClientRegistry;
use crate::transport::{send_text, Transport};
use crate::weather::BulletinSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Résultat d'une diffusion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub evicted: Vec<ClientEndpoint>,
}

/// Envoie `message` à chaque membre du registre, séquentiellement.
/// Un échec d'envoi retire l'endpoint concerné et on continue.
pub async fn broadcast_message(
    transport: &dyn Transport,
    registry: &ClientRegistry,
    message: &str,
) -> FanOut {
    let mut report = FanOut::default();
    for endpoint in registry.snapshot() {
        match send_text(transport, message, endpoint).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!(client = %endpoint, "send failed, evicting subscriber: {e}");
                registry.remove(&endpoint);
                report.evicted.push(endpoint);
            }
        }
    }
    report
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Aucune cible : rien n'est fetché ni envoyé.
    Idle,
    /// Cible active mais personne à servir : pas d'appel provider.
    NoSubscribers,
    /// Cible changée pendant le fetch : rien n'est envoyé.
    Superseded,
    Broadcast {
        delivered: usize,
        evicted: usize,
        upstream_ok: bool,
    },
}

/// Ce que diffuse la boucle.
enum Feed {
    Traffic {
        monitor: MonitorState,
        provider: Arc<dyn DataProvider>,
    },
    Weather(Arc<dyn BulletinSource>),
}

pub struct BroadcastLoop {
    transport: Arc<dyn Transport>,
    registry: ClientRegistry,
    feed: Feed,
    interval: Duration,
    provider_timeout: Duration,
}

impl BroadcastLoop {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: ClientRegistry,
        monitor: MonitorState,
        provider: Arc<dyn DataProvider>,
        interval: Duration,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            feed: Feed::Traffic { monitor, provider },
            interval,
            provider_timeout,
        }
    }

    /// Boucle du mode météo : pas de cible, un bulletin par tick.
    pub fn weather(
        transport: Arc<dyn Transport>,
        registry: ClientRegistry,
        source: Arc<dyn BulletinSource>,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            feed: Feed::Weather(source),
            interval,
            provider_timeout: fetch_timeout,
        }
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        match &self.feed {
            Feed::Traffic { monitor, provider } => {
                self.traffic_cycle(monitor, provider.as_ref()).await
            }
            Feed::Weather(source) => self.weather_cycle(source.as_ref()).await,
        }
    }

    async fn traffic_cycle(
        &self,
        monitor: &MonitorState,
        provider: &dyn DataProvider,
    ) -> CycleOutcome {
        // copie de la cible : aucun verrou pendant l'appel provider
        let Some(target) = monitor.snapshot() else {
            debug!("idle, skipping cycle");
            return CycleOutcome::Idle;
        };
        if self.registry.is_empty() {
            debug!(location = %target.name, "no subscribers, skipping fetch");
            return CycleOutcome::NoSubscribers;
        }

        let result = bounded(
            self.provider_timeout,
            provider.fetch_reading(target.coordinates()),
        )
        .await;

        if monitor.snapshot().as_ref() != Some(&target) {
            debug!(location = %target.name, "target changed during fetch, dropping line");
            return CycleOutcome::Superseded;
        }

        let (message, upstream_ok) = match result {
            Ok(reading) => (protocol::status_line(&reading), true),
            Err(e) => {
                warn!(location = %target.name, "fetch failed: {e}");
                (protocol::fetch_failure_line(&e.to_string()), false)
            }
        };
        self.fan_out(&message, upstream_ok).await
    }

    async fn weather_cycle(&self, source: &dyn BulletinSource) -> CycleOutcome {
        if self.registry.is_empty() {
            debug!("no subscribers, skipping bulletin fetch");
            return CycleOutcome::NoSubscribers;
        }

        let fetched = bounded(self.provider_timeout, source.fetch_bulletin()).await;
        let (message, upstream_ok) = match fetched {
            Ok(bulletin) => (protocol::bulletin_line(&bulletin), true),
            Err(e) => {
                warn!("bulletin fetch failed: {e}");
                (protocol::weather_failure_line(&e.to_string()), false)
            }
        };
        self.fan_out(&message, upstream_ok).await
    }

    async fn fan_out(&self, message: &str, upstream_ok: bool) -> CycleOutcome {
        let report = broadcast_message(self.transport.as_ref(), &self.registry, message).await;
        info!(
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "broadcast: {message}"
        );

        CycleOutcome::Broadcast {
            delivered: report.delivered,
            evicted: report.evicted.len(),
            upstream_ok,
        }
    }

    /// Boucle principale jusqu'au signal d'arrêt. Le premier cycle part tout de suite.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("broadcast loop started (every {:.1}s)", self.interval.as_secs_f64());
        // tokio refuse une période nulle
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.run_cycle() => {}
                        _ = shutdown.changed() => break,
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("broadcast loop stopped");
    }
}
