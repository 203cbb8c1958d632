use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Un abonné = l'adresse (host, port) d'où viennent ses datagrammes.
pub type ClientEndpoint = SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Cible surveillée : le nom tel que demandé par le client + ses coordonnées.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorTarget {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl MonitorTarget {
    pub fn new(name: impl Into<String>, coords: Coordinates) -> Self {
        Self {
            name: name.into(),
            latitude: coords.latitude,
            longitude: coords.longitude,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Relevé trafic produit par le provider, consommé dans le même cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficReading {
    pub timestamp: DateTime<Local>,
    pub place_name: String,
    pub current_speed: u32,
    pub free_flow_speed: u32,
    pub congestion_percent: f64,
    pub confidence: f64,
}

/// Bulletin météo extrait de la page nowcast BMKG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bulletin {
    /// Premier paragraphe significatif de l'alerte.
    Nowcast(String),
    /// Pas de paragraphe exploitable : titre de la page.
    Headline(String),
}
