/*!
Test Harness pour le serveur Lalin

Démarre un vrai `Server` sur 127.0.0.1:0 avec un MockProvider, et fournit
des abonnés UDP de test pour les scénarios de bout en bout.
*/

use crate::mock_bulletin::MockBulletin;
use crate::mock_provider::MockProvider;
use anyhow::{Context, Result};
use lalin_server::{protocol, ClientRegistry, MonitorState, Server, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Subscriber UDP de test : parle au serveur comme le client terminal.
pub struct TestSubscriber {
    socket: UdpSocket,
    server: SocketAddr,
}

impl TestSubscriber {
    pub async fn connect(server: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        Ok(Self { socket, server })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    pub async fn send(&self, text: &str) -> Result<()> {
        self.socket.send_to(text.as_bytes(), self.server).await?;
        Ok(())
    }

    /// Prochain message, ou `None` si rien n'arrive avant `wait`.
    pub async fn recv_within(&self, wait: Duration) -> Option<String> {
        let mut buf = vec![0u8; 2048];
        match timeout(wait, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(String::from_utf8_lossy(&buf[..len]).into_owned()),
            _ => None,
        }
    }

    /// Prochain message, erreur si rien n'arrive avant `wait`.
    pub async fn expect_message(&self, wait: Duration) -> Result<String> {
        self.recv_within(wait)
            .await
            .with_context(|| format!("no datagram received within {wait:?}"))
    }

    /// Saute les messages jusqu'à en trouver un qui commence par `prefix`.
    pub async fn expect_prefixed(&self, prefix: &str, wait: Duration) -> Result<String> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let msg = self
                .recv_within(remaining)
                .await
                .with_context(|| format!("no message starting with '{prefix}' within {wait:?}"))?;
            if msg.starts_with(prefix) {
                return Ok(msg);
            }
            tracing::debug!("skipping '{msg}' while waiting for '{prefix}'");
        }
    }

    /// Vide la file de réception.
    pub async fn drain(&self) -> Vec<String> {
        let mut drained = Vec::new();
        while let Some(msg) = self.recv_within(Duration::from_millis(50)).await {
            drained.push(msg);
        }
        drained
    }
}

/// Serveur de test complet, arrêté par `shutdown()`.
pub struct TestHarness {
    pub provider: MockProvider,
    /// Branché uniquement par `start_weather`.
    pub bulletin: MockBulletin,
    pub registry: ClientRegistry,
    pub monitor: MonitorState,
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TestHarness {
    /// Config de test : port éphémère, ticks rapides, timeout court.
    pub fn test_config(interval: Duration) -> ServerConfig {
        let mut cfg = ServerConfig::default();
        cfg.server.host = [127, 0, 0, 1].into();
        cfg.server.port = Some(0);
        cfg.broadcast.interval_secs = Some(interval.as_secs_f64());
        cfg.provider.timeout_secs = 1.0;
        cfg
    }

    pub async fn start(provider: MockProvider, config: ServerConfig) -> Result<Self> {
        init_tracing();
        let server = Server::bind(config, Arc::new(provider.clone()))
            .await
            .context("test server bind failed")?;
        Self::launch(server, provider, MockBulletin::new())
    }

    /// Serveur en mode météo alimenté par `bulletin`.
    pub async fn start_weather(bulletin: MockBulletin, config: ServerConfig) -> Result<Self> {
        init_tracing();
        let server = Server::bind_weather(config, Arc::new(bulletin.clone()))
            .await
            .context("test weather server bind failed")?;
        Self::launch(server, MockProvider::new(), bulletin)
    }

    fn launch(server: Server, provider: MockProvider, bulletin: MockBulletin) -> Result<Self> {
        let addr = server.local_addr()?;
        let registry = server.registry();
        let monitor = server.monitor();

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async move {
            stopped.await.ok();
        }));

        Ok(Self {
            provider,
            bulletin,
            registry,
            monitor,
            addr,
            stop: Some(stop),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn subscriber(&self) -> Result<TestSubscriber> {
        TestSubscriber::connect(self.addr).await
    }

    /// Abonné déjà inscrit : JOIN envoyé et welcome consommé.
    pub async fn joined_subscriber(&self) -> Result<TestSubscriber> {
        let sub = self.subscriber().await?;
        sub.send("JOIN").await?;
        sub.expect_prefixed(protocol::WELCOME, Duration::from_secs(2))
            .await?;
        Ok(sub)
    }

    /// Arrête le serveur et attend la fin des boucles.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            timeout(Duration::from_secs(5), task)
                .await
                .context("server did not stop in time")??;
        }
        Ok(())
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init()
        .ok();
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
