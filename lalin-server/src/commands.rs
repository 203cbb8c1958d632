/**
 * COMMAND PROCESSOR - Boucle de réception UDP et exécution des commandes
 *
 * RÔLE : Lit chaque datagramme, l'attache au registre (tout message valide
 * compte comme inscription), puis exécute JOIN / SEARCH / RESET.
 *
 * FONCTIONNEMENT :
 * - Premier message valide d'un endpoint -> welcome en unicast (une seule fois)
 * - SEARCH:<texte> -> géocodage ; succès = nouvelle cible + confirmation à tous,
 *   échec = notice à l'émetteur seul, cible inchangée
 * - RESET -> idle ; confirmation à tous si une cible était active, sinon
 *   notice à l'émetteur seul
 * - Datagramme non décodable ou vide : ignoré sans réponse
 *
 * MODE MÉTÉO (`join_only`) : seul JOIN inscrit, sans welcome ; tout le
 * reste est ignoré et n'inscrit pas l'émetteur.
 *
 * Le processeur ne garde aucun état entre deux messages : tout vit dans
 * ClientRegistry et MonitorState. Aucune erreur ne termine la boucle.
 */

use crate::broadcast::broadcast_message;
use crate::models::{ClientEndpoint, MonitorTarget};
use crate::monitor::MonitorState;
use crate::protocol::{self, Command};
use crate::provider::{bounded, DataProvider};
use crate::registry::ClientRegistry;
use crate::transport::{send_text, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Ce qu'a produit un datagramme, pour les logs et les tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Non décodable / vide : rien n'a été fait.
    Dropped,
    Joined { new: bool },
    TargetChanged { name: String, notified: usize },
    LookupFailed { name: String },
    Reset { notified: usize },
    AlreadyIdle,
    Ignored,
}

/// Ce qu'il faut pour exécuter SEARCH / RESET.
struct Steering {
    monitor: MonitorState,
    provider: Arc<dyn DataProvider>,
    provider_timeout: Duration,
}

pub struct CommandProcessor {
    transport: Arc<dyn Transport>,
    registry: ClientRegistry,
    steering: Option<Steering>,
    recv_buffer: usize,
}

impl CommandProcessor {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: ClientRegistry,
        monitor: MonitorState,
        provider: Arc<dyn DataProvider>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            steering: Some(Steering {
                monitor,
                provider,
                provider_timeout,
            }),
            recv_buffer: 2048,
        }
    }

    /// Processeur du mode météo : inscription par JOIN uniquement.
    pub fn join_only(transport: Arc<dyn Transport>, registry: ClientRegistry) -> Self {
        Self {
            transport,
            registry,
            steering: None,
            recv_buffer: 2048,
        }
    }

    pub fn with_recv_buffer(mut self, size: usize) -> Self {
        self.recv_buffer = size.max(1);
        self
    }

    /// Traite un datagramme reçu de `from`.
    pub async fn handle_datagram(&self, payload: &[u8], from: ClientEndpoint) -> Handled {
        let command = match protocol::parse_command(payload) {
            Ok(command) => command,
            Err(e) => {
                debug!(client = %from, "dropping datagram: {e}");
                return Handled::Dropped;
            }
        };

        let Some(steering) = &self.steering else {
            return self.handle_join_only(command, from);
        };

        let is_new = self.registry.add(from);
        if is_new {
            self.reply(protocol::WELCOME, from).await;
        }

        match command {
            Command::Join => Handled::Joined { new: is_new },
            Command::Search(query) => self.handle_search(steering, query, from).await,
            Command::Reset => self.handle_reset(steering, from).await,
            Command::Unknown(text) => {
                debug!(client = %from, "ignoring unknown command: {text}");
                Handled::Ignored
            }
        }
    }

    fn handle_join_only(&self, command: Command, from: ClientEndpoint) -> Handled {
        match command {
            Command::Join => {
                let new = self.registry.add(from);
                if new {
                    info!(client = %from, "new weather subscriber");
                }
                Handled::Joined { new }
            }
            other => {
                debug!(client = %from, "weather mode ignores {other:?}");
                Handled::Ignored
            }
        }
    }

    async fn handle_search(
        &self,
        steering: &Steering,
        query: String,
        from: ClientEndpoint,
    ) -> Handled {
        info!(client = %from, "search request for '{query}'");

        let lookup = bounded(
            steering.provider_timeout,
            steering.provider.resolve_location(&query),
        )
        .await;
        match lookup {
            Ok(coords) => {
                steering.monitor.set(MonitorTarget::new(query.clone(), coords));
                info!(
                    "monitoring '{query}' ({}, {})",
                    coords.latitude, coords.longitude
                );
                let report = broadcast_message(
                    self.transport.as_ref(),
                    &self.registry,
                    &protocol::search_ok(&query),
                )
                .await;
                Handled::TargetChanged {
                    name: query,
                    notified: report.delivered,
                }
            }
            Err(e) => {
                warn!(client = %from, "lookup for '{query}' failed: {e}");
                let notice = if e.is_transient() {
                    protocol::search_failed(&query, &e.to_string())
                } else {
                    protocol::search_not_found(&query)
                };
                self.reply(&notice, from).await;
                Handled::LookupFailed { name: query }
            }
        }
    }

    async fn handle_reset(&self, steering: &Steering, from: ClientEndpoint) -> Handled {
        match steering.monitor.clear() {
            Some(previous) => {
                info!(client = %from, "reset: stopped monitoring '{}'", previous.name);
                let report = broadcast_message(
                    self.transport.as_ref(),
                    &self.registry,
                    &protocol::standby(),
                )
                .await;
                Handled::Reset {
                    notified: report.delivered,
                }
            }
            None => {
                self.reply(&protocol::already_idle(), from).await;
                Handled::AlreadyIdle
            }
        }
    }

    /// Unicast. Un échec d'envoi évince l'endpoint comme pour un broadcast.
    async fn reply(&self, text: &str, to: ClientEndpoint) {
        if let Err(e) = send_text(self.transport.as_ref(), text, to).await {
            warn!(client = %to, "reply failed, evicting subscriber: {e}");
            self.registry.remove(&to);
        }
    }

    /// Boucle de réception jusqu'au signal d'arrêt.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("command loop started");
        let mut buf = vec![0u8; self.recv_buffer];

        loop {
            let received = tokio::select! {
                received = self.transport.recv_from(&mut buf) => received,
                _ = shutdown.changed() => break,
            };

            match received {
                Ok((len, from)) => {
                    let outcome = tokio::select! {
                        outcome = self.handle_datagram(&buf[..len], from) => outcome,
                        _ = shutdown.changed() => break,
                    };
                    debug!(client = %from, ?outcome, "datagram handled");
                }
                Err(e) => {
                    // ex: ICMP port unreachable remonté sur certains OS
                    warn!("receive error: {e}");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
        info!("command loop stopped");
    }
}
