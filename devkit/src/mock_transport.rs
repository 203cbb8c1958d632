/*!
Mock Transport pour tests sans socket

Enregistre chaque datagramme envoyé, permet de programmer des échecs d'envoi
par endpoint et d'injecter des datagrammes entrants.
*/

use async_trait::async_trait;
use lalin_server::Transport;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    pub to: SocketAddr,
    pub text: String,
}

#[derive(Clone)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<SentDatagram>>>,
    failing: Arc<Mutex<HashSet<SocketAddr>>>,
    inbound_tx: mpsc::UnboundedSender<io::Result<(Vec<u8>, SocketAddr)>>,
    inbound_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<io::Result<(Vec<u8>, SocketAddr)>>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            inbound_tx,
            inbound_rx: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
        }
    }

    /// Tout envoi vers `endpoint` échouera (hôte injoignable).
    pub fn fail_sends_to(&self, endpoint: SocketAddr) {
        self.failing.lock().insert(endpoint);
    }

    /// Simule la réception d'un datagramme.
    pub fn inject(&self, payload: impl Into<Vec<u8>>, from: SocketAddr) {
        let _ = self.inbound_tx.send(Ok((payload.into(), from)));
    }

    /// Simule une erreur de réception (hors payload).
    pub fn inject_error(&self, kind: io::ErrorKind) {
        let _ = self.inbound_tx.send(Err(io::Error::new(kind, "simulated receive error")));
    }

    pub fn sent(&self) -> Vec<SentDatagram> {
        self.sent.lock().clone()
    }

    /// Messages reçus par un endpoint donné, dans l'ordre d'envoi.
    pub fn sent_to(&self, endpoint: SocketAddr) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|d| d.to == endpoint)
            .map(|d| d.text.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let next = self.inbound_rx.lock().await.recv().await;
        match next {
            Some(Ok((payload, from))) => {
                // tronqué comme le ferait un vrai recv_from
                let len = payload.len().min(buf.len());
                buf[..len].copy_from_slice(&payload[..len]);
                Ok((len, from))
            }
            Some(Err(e)) => Err(e),
            // le sender vit dans self : n'arrive pas
            None => std::future::pending().await,
        }
    }

    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        if self.failing.lock().contains(&target) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("simulated failure towards {target}"),
            ));
        }
        self.sent.lock().push(SentDatagram {
            to: target,
            text: String::from_utf8_lossy(payload).into_owned(),
        });
        Ok(payload.len())
    }
}
