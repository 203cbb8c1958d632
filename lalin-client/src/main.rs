/**
 * LALIN CLIENT - Abonné terminal du serveur de trafic
 *
 * RÔLE :
 * S'inscrit auprès du serveur (JOIN), affiche chaque diffusion reçue et
 * relaie les lignes tapées au clavier comme commandes (SEARCH:..., RESET).
 *
 * FONCTIONNEMENT :
 * - Socket UDP éphémère, JOIN envoyé au démarrage
 * - Tâche de réception : décode les lignes de statut, ajoute le niveau de congestion
 * - Boucle stdin : `quit` ou Ctrl+C pour sortir ; stdin fermé (EOF) ->
 *   on continue d'écouter jusqu'à Ctrl+C
 */

mod status;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use status::StatusLine;

#[derive(Parser, Debug)]
#[command(name = "lalin-client", about = "Terminal subscriber for the Lalin traffic broadcast server")]
struct Args {
    /// Adresse du serveur
    #[arg(short, long, default_value = "127.0.0.1:5005")]
    server: SocketAddr,

    /// Lieu à surveiller dès l'inscription
    #[arg(long)]
    search: Option<String>,
}

/// Mise en forme d'une diffusion pour le terminal.
fn render(line: &str) -> String {
    match line.parse::<StatusLine>() {
        Ok(status) => format!("{line}  [{}]", status.level()),
        Err(_) => line.to_string(),
    }
}

/// Ligne clavier -> commande, `None` pour les lignes vides.
fn to_command(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Pourquoi la lecture du clavier s'est arrêtée.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputEnd {
    Quit,
    Eof,
}

/// Relaie chaque ligne non vide de `input` au serveur jusqu'à `quit` ou EOF.
async fn forward_commands<R>(input: R, socket: &UdpSocket, server: SocketAddr) -> Result<InputEnd>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().eq_ignore_ascii_case("quit") {
            return Ok(InputEnd::Quit);
        }
        if let Some(command) = to_command(&line) {
            socket.send_to(command.as_bytes(), server).await?;
        }
    }
    Ok(InputEnd::Eof)
}

async fn receive_loop(socket: Arc<UdpSocket>, server: SocketAddr) {
    let mut buf = vec![0u8; 2048];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                if from != server {
                    debug!("ignoring datagram from {from}");
                    continue;
                }
                let text = String::from_utf8_lossy(&buf[..len]);
                println!("{}", render(text.trim_end()));
            }
            Err(e) => {
                warn!("receive error: {e}");
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();
    let bind: SocketAddr = if args.server.is_ipv4() {
        "0.0.0.0:0".parse()?
    } else {
        "[::]:0".parse()?
    };
    let socket = Arc::new(
        UdpSocket::bind(bind)
            .await
            .context("cannot bind local UDP socket")?,
    );
    info!("subscribing to {}", args.server);

    socket.send_to(b"JOIN", args.server).await?;
    if let Some(place) = args.search.as_deref() {
        socket
            .send_to(format!("SEARCH:{place}").as_bytes(), args.server)
            .await?;
    }

    let receiver = tokio::spawn(receive_loop(socket.clone(), args.server));

    println!("Terhubung ke {}. Ketik SEARCH:<lokasi>, RESET, atau quit.", args.server);
    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        end = forward_commands(stdin, &socket, args.server) => {
            if end? == InputEnd::Eof {
                info!("stdin closed, still listening (Ctrl+C to quit)");
                tokio::signal::ctrl_c().await?;
            }
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    receiver.abort();
    Ok(())
}
