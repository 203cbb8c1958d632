//! Décodage des lignes de statut `[LALU LINTAS] ...` envoyées par le serveur.

use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;

const STATUS_PREFIX: &str = "[LALU LINTAS] ";
const FAILURE_MARKER: &str = "Gagal ambil data";

#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub timestamp: NaiveDateTime,
    pub place: String,
    pub speed_kmh: u32,
    pub congestion_percent: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusParseError {
    #[error("not a status line")]
    NotStatus,
    #[error("status line reports a fetch failure")]
    FetchFailure,
    #[error("missing or malformed field '{0}'")]
    Field(&'static str),
}

fn labelled<'a>(part: Option<&'a str>, label: &'static str) -> Result<&'a str, StatusParseError> {
    part.and_then(|p| p.strip_prefix(label))
        .map(str::trim)
        .ok_or(StatusParseError::Field(label))
}

impl FromStr for StatusLine {
    type Err = StatusParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let body = line
            .trim()
            .strip_prefix(STATUS_PREFIX)
            .ok_or(StatusParseError::NotStatus)?;
        if body.starts_with(FAILURE_MARKER) {
            return Err(StatusParseError::FetchFailure);
        }

        let mut parts = body.split(" | ");
        let timestamp = parts
            .next()
            .and_then(|t| NaiveDateTime::parse_from_str(t.trim(), "%Y-%m-%d %H:%M:%S").ok())
            .ok_or(StatusParseError::Field("timestamp"))?;
        let place = labelled(parts.next(), "Lokasi:")?.to_string();
        let speed_kmh = labelled(parts.next(), "Kecepatan:")?
            .strip_suffix("km/jam")
            .and_then(|s| s.trim().parse().ok())
            .ok_or(StatusParseError::Field("Kecepatan:"))?;
        let congestion_percent = labelled(parts.next(), "Kemacetan:")?
            .strip_suffix('%')
            .and_then(|s| s.trim().parse().ok())
            .ok_or(StatusParseError::Field("Kemacetan:"))?;
        let confidence = labelled(parts.next(), "Confidence:")?
            .parse()
            .map_err(|_| StatusParseError::Field("Confidence:"))?;

        Ok(StatusLine {
            timestamp,
            place,
            speed_kmh,
            congestion_percent,
            confidence,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionLevel {
    Lancar,
    Padat,
    Macet,
}

impl CongestionLevel {
    /// < 30 % lancar, < 70 % padat, au-delà macet.
    pub fn from_percent(percent: f64) -> Self {
        if percent < 30.0 {
            CongestionLevel::Lancar
        } else if percent < 70.0 {
            CongestionLevel::Padat
        } else {
            CongestionLevel::Macet
        }
    }
}

impl fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CongestionLevel::Lancar => "LANCAR",
            CongestionLevel::Padat => "PADAT",
            CongestionLevel::Macet => "MACET",
        };
        f.write_str(label)
    }
}

impl StatusLine {
    pub fn level(&self) -> CongestionLevel {
        CongestionLevel::from_percent(self.congestion_percent)
    }
}
