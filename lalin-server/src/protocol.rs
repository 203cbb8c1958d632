/**
 * PROTOCOLE UDP - Commandes entrantes et messages sortants
 *
 * RÔLE : Contrat texte partagé avec les clients (terminal, GUI).
 * Entrée : JOIN, SEARCH:<texte>, RESET (insensibles à la casse).
 * Sortie : lignes UTF-8 sans saut de ligne, préfixées [SERVER] ou [LALU LINTAS]
 * (mode trafic), ou bulletins BMKG (mode météo).
 *
 * Le format du broadcast de statut (ordre des champs, " | ", libellés) est
 * parsé tel quel par les clients : ne pas le modifier.
 */

use crate::models::{Bulletin, TrafficReading};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const WELCOME: &str = "[SERVER] Anda berhasil terhubung! Silakan cari lokasi.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Search(String),
    Reset,
    /// Texte valide mais sans commande reconnue : pas de réponse.
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("payload is empty")]
    Empty,
}

const SEARCH_PREFIX: &str = "SEARCH:";

/// Décode un datagramme en commande.
pub fn parse_command(payload: &[u8]) -> Result<Command, ProtocolError> {
    let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?;
    let message = text.trim();
    if message.is_empty() {
        return Err(ProtocolError::Empty);
    }

    if message.eq_ignore_ascii_case("JOIN") {
        return Ok(Command::Join);
    }
    if message.eq_ignore_ascii_case("RESET") {
        return Ok(Command::Reset);
    }

    let has_search_prefix = message
        .get(..SEARCH_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SEARCH_PREFIX));
    if has_search_prefix {
        let query = message[SEARCH_PREFIX.len()..].trim();
        if !query.is_empty() {
            return Ok(Command::Search(query.to_string()));
        }
    }

    Ok(Command::Unknown(message.to_string()))
}

/// Les messages sortants tiennent sur une ligne.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

pub fn status_line(reading: &TrafficReading) -> String {
    format!(
        "[LALU LINTAS] {} | Lokasi: {} | Kecepatan: {} km/jam | Kemacetan: {:.1}% | Confidence: {:?}",
        reading.timestamp.format(TIMESTAMP_FORMAT),
        single_line(&reading.place_name),
        reading.current_speed,
        reading.congestion_percent,
        reading.confidence,
    )
}

pub fn fetch_failure_line(cause: &str) -> String {
    format!("[LALU LINTAS] Gagal ambil data: {}", single_line(cause))
}

/// Longueur max (en caractères) du texte d'un bulletin nowcast.
pub const BULLETIN_MAX_CHARS: usize = 200;
const WEATHER_CAUSE_MAX_CHARS: usize = 100;

/// Coupe à `max` caractères (jamais au milieu d'un caractère UTF-8), "..." si coupé.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn bulletin_line(bulletin: &Bulletin) -> String {
    match bulletin {
        Bulletin::Nowcast(text) => format!(
            "🌦️ BMKG Nowcast: {}",
            truncate_chars(&single_line(text), BULLETIN_MAX_CHARS)
        ),
        Bulletin::Headline(title) => format!("🌦️ {} - Data dari BMKG", single_line(title)),
    }
}

pub fn weather_failure_line(cause: &str) -> String {
    format!(
        "⚠️ Gagal ambil data BMKG: {}",
        truncate_chars(&single_line(cause), WEATHER_CAUSE_MAX_CHARS)
    )
}

pub fn search_ok(name: &str) -> String {
    format!(
        "[SERVER] OK: Lokasi pemantauan diubah ke '{}'. Update akan dimulai.",
        single_line(name)
    )
}

pub fn search_not_found(name: &str) -> String {
    format!("[SERVER] GAGAL: Lokasi '{}' tidak ditemukan.", single_line(name))
}

pub fn search_failed(name: &str, cause: &str) -> String {
    format!(
        "[SERVER] GAGAL: Lokasi '{}' tidak dapat dicari: {}",
        single_line(name),
        single_line(cause)
    )
}

pub fn standby() -> String {
    "[SERVER] OK: Pemantauan dihentikan. Server dalam mode standby.".to_string()
}

pub fn already_idle() -> String {
    "[SERVER] INFO: Server sudah dalam mode standby, tidak ada lokasi yang dipantau.".to_string()
}
