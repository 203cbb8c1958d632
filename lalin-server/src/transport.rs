//! Datagram transport shared by the command loop and the broadcast loop.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize>;
}

#[async_trait]
impl Transport for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, payload, target).await
    }
}

/// Un send partiel compte comme un échec : le datagramme est perdu.
pub async fn send_text(transport: &dyn Transport, text: &str, target: SocketAddr) -> io::Result<()> {
    let payload = text.as_bytes();
    let sent = transport.send_to(payload, target).await?;
    if sent != payload.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("datagram truncated ({sent}/{} bytes)", payload.len()),
        ));
    }
    Ok(())
}
