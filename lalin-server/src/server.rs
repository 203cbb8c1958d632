/**
 * SERVER - Assemblage du transport, de l'état partagé et des deux boucles
 *
 * RÔLE : Bind du socket UDP (seule erreur fatale), puis lancement de
 * la boucle commandes + la boucle broadcast (+ éviction des inactifs si
 * configurée). Arrêt : signal -> watch channel -> join des tâches -> socket fermé.
 *
 * Deux modes : trafic (provider TomTom, SEARCH/RESET) ou météo (bulletin
 * BMKG, JOIN seul).
 */

use crate::broadcast::BroadcastLoop;
use crate::commands::CommandProcessor;
use crate::config::ServerConfig;
use crate::monitor::MonitorState;
use crate::provider::DataProvider;
use crate::registry::ClientRegistry;
use crate::transport::Transport;
use crate::weather::BulletinSource;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{error, info};

enum Source {
    Traffic(Arc<dyn DataProvider>),
    Weather(Arc<dyn BulletinSource>),
}

pub struct Server {
    socket: Arc<UdpSocket>,
    registry: ClientRegistry,
    monitor: MonitorState,
    source: Source,
    config: ServerConfig,
}

impl Server {
    /// Serveur trafic : la cible initiale vient de `initial_target`.
    pub async fn bind(config: ServerConfig, provider: Arc<dyn DataProvider>) -> io::Result<Self> {
        let monitor = MonitorState::with_target(config.initial_target.clone());
        Self::bind_source(config, monitor, Source::Traffic(provider)).await
    }

    /// Serveur météo : pas de cible, le bulletin est diffusé tel quel.
    pub async fn bind_weather(
        config: ServerConfig,
        source: Arc<dyn BulletinSource>,
    ) -> io::Result<Self> {
        Self::bind_source(config, MonitorState::new(), Source::Weather(source)).await
    }

    async fn bind_source(
        config: ServerConfig,
        monitor: MonitorState,
        source: Source,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr()).await?;
        Ok(Self {
            socket: Arc::new(socket),
            registry: ClientRegistry::new(),
            monitor,
            source,
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn registry(&self) -> ClientRegistry {
        self.registry.clone()
    }

    pub fn monitor(&self) -> MonitorState {
        self.monitor.clone()
    }

    /// Tourne jusqu'à ce que `signal` se termine, puis arrête proprement les boucles.
    pub async fn run_until<F>(self, signal: F)
    where
        F: Future<Output = ()>,
    {
        let transport: Arc<dyn Transport> = self.socket.clone();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let interval = self.config.broadcast_interval();
        let timeout = self.config.provider_timeout();

        let (commands, broadcaster) = match &self.source {
            Source::Traffic(provider) => {
                match self.monitor.snapshot() {
                    Some(target) => info!("initial target: {}", target.name),
                    None => info!("no initial target, waiting for SEARCH"),
                }
                (
                    CommandProcessor::new(
                        transport.clone(),
                        self.registry.clone(),
                        self.monitor.clone(),
                        provider.clone(),
                        timeout,
                    ),
                    BroadcastLoop::new(
                        transport,
                        self.registry.clone(),
                        self.monitor.clone(),
                        provider.clone(),
                        interval,
                        timeout,
                    ),
                )
            }
            Source::Weather(source) => {
                info!("weather mode, bulletin every {:.0}s", interval.as_secs_f64());
                (
                    CommandProcessor::join_only(transport.clone(), self.registry.clone()),
                    BroadcastLoop::weather(
                        transport,
                        self.registry.clone(),
                        source.clone(),
                        interval,
                        timeout,
                    ),
                )
            }
        };
        let commands = commands.with_recv_buffer(self.config.server.recv_buffer);

        let mut tasks = vec![
            tokio::spawn(commands.run(shutdown_rx.clone())),
            tokio::spawn(broadcaster.run(shutdown_rx.clone())),
        ];
        if let Some(max_idle) = self.config.client_idle_timeout() {
            tasks.push(self.registry.spawn_idle_eviction(max_idle, shutdown_rx));
        }

        signal.await;
        info!("shutting down");
        let _ = shutdown_tx.send(true);

        for task in tasks {
            if let Err(e) = task.await {
                error!("task ended abnormally: {e}");
            }
        }
        info!("stopped ({} subscribers dropped)", self.registry.len());
    }
}
