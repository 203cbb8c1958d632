use crate::models::{Coordinates, MonitorTarget};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

pub const CONFIG_PATH_ENV: &str = "LALIN_SERVER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "lalin.yaml";
pub const BMKG_NOWCAST_URL: &str = "https://www.bmkg.go.id/alerts/nowcast/id";

const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);
/// Bornes des périodes (intervalle, timeout) acceptées par tokio et reqwest.
const MIN_PERIOD: Duration = Duration::from_millis(1);
const MAX_PERIOD: Duration = Duration::from_secs(86_400);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
    #[error("TOMTOM_API_KEY is not set (env, .env or provider.api_key)")]
    MissingApiKey,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: BindConf,
    pub broadcast: BroadcastConf,
    pub provider: ProviderConf,
    pub weather: WeatherConf,
    pub mode: ServerMode,
    pub initial_target: Option<MonitorTarget>,
}

/// `traffic` : serveur TomTom pilotable (SEARCH/RESET).
/// `weather` : bulletin BMKG fixe, JOIN uniquement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Traffic,
    Weather,
}

impl ServerMode {
    pub fn default_port(self) -> u16 {
        match self {
            ServerMode::Traffic => 5005,
            ServerMode::Weather => 5000,
        }
    }

    pub fn default_interval(self) -> Duration {
        match self {
            ServerMode::Traffic => Duration::from_millis(3500),
            ServerMode::Weather => Duration::from_secs(60),
        }
    }
}

impl std::str::FromStr for ServerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "traffic" => Ok(ServerMode::Traffic),
            "weather" => Ok(ServerMode::Weather),
            other => Err(ConfigError::Invalid(format!("unknown mode '{other}'"))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BindConf {
    pub host: IpAddr,
    /// Absent -> port par défaut du mode (5005 trafic, 5000 météo).
    pub port: Option<u16>,
    pub recv_buffer: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BroadcastConf {
    /// Absent -> 3.5 s en trafic, 60 s en météo.
    pub interval_secs: Option<f64>,
    pub client_idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderConf {
    pub api_key: Option<String>,
    pub timeout_secs: f64,
    pub country_set: String,
    pub base_url: String,
}

impl ProviderConf {
    /// Timeout validé ; une valeur hors bornes retombe sur 10 s.
    pub fn timeout(&self) -> Duration {
        checked_period("provider.timeout_secs", self.timeout_secs)
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WeatherConf {
    pub url: String,
}

impl Default for WeatherConf {
    fn default() -> Self {
        Self {
            url: BMKG_NOWCAST_URL.into(),
        }
    }
}

/// Secondes (YAML/env) -> Duration ; refuse NaN, négatif, débordement et
/// tout ce qui sort de [1 ms, 1 jour].
fn checked_period(field: &str, secs: f64) -> Result<Duration, ConfigError> {
    let period = Duration::try_from_secs_f64(secs)
        .map_err(|_| ConfigError::Invalid(format!("{field} = {secs} is not a valid duration")))?;
    if !(MIN_PERIOD..=MAX_PERIOD).contains(&period) {
        return Err(ConfigError::Invalid(format!(
            "{field} = {secs} must be between 0.001 and 86400 seconds"
        )));
    }
    Ok(period)
}

impl Default for BindConf {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: None,
            recv_buffer: 2048,
        }
    }
}

impl Default for BroadcastConf {
    fn default() -> Self {
        Self {
            interval_secs: None,
            client_idle_timeout_secs: None,
        }
    }
}

impl Default for ProviderConf {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout_secs: 10.0,
            country_set: "ID".into(),
            base_url: "https://api.tomtom.com".into(),
        }
    }
}

impl ServerConfig {
    pub fn port(&self) -> u16 {
        self.server.port.unwrap_or(self.mode.default_port())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.port())
    }

    /// Intervalle validé ; une valeur hors bornes retombe sur celui du mode.
    pub fn broadcast_interval(&self) -> Duration {
        match self.broadcast.interval_secs {
            Some(secs) => checked_period("broadcast.interval_secs", secs)
                .unwrap_or(self.mode.default_interval()),
            None => self.mode.default_interval(),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        self.provider.timeout()
    }

    pub fn client_idle_timeout(&self) -> Option<Duration> {
        self.broadcast.client_idle_timeout_secs.map(Duration::from_secs)
    }

    /// Surcharges par variables d'environnement (LALIN_MODE, LALIN_HOST, LALIN_PORT,
    /// LALIN_INTERVAL_SECS, TOMTOM_API_KEY). `lookup` = std::env::var en prod.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("LALIN_MODE") {
            self.mode = mode.parse()?;
        }
        if let Some(host) = lookup("LALIN_HOST") {
            self.server.host = host
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("LALIN_HOST={host}")))?;
        }
        if let Some(port) = lookup("LALIN_PORT") {
            self.server.port = Some(
                port.parse()
                    .map_err(|_| ConfigError::Invalid(format!("LALIN_PORT={port}")))?,
            );
        }
        if let Some(interval) = lookup("LALIN_INTERVAL_SECS") {
            self.broadcast.interval_secs = Some(
                interval
                    .parse()
                    .map_err(|_| ConfigError::Invalid(format!("LALIN_INTERVAL_SECS={interval}")))?,
            );
        }
        if let Some(key) = lookup("TOMTOM_API_KEY") {
            self.provider.api_key = Some(key);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secs) = self.broadcast.interval_secs {
            checked_period("broadcast.interval_secs", secs)?;
        }
        checked_period("provider.timeout_secs", self.provider.timeout_secs)?;
        if self.mode == ServerMode::Weather && self.weather.url.trim().is_empty() {
            return Err(ConfigError::Invalid("weather.url must not be empty".into()));
        }
        if self.server.recv_buffer == 0 {
            return Err(ConfigError::Invalid("server.recv_buffer must be > 0".into()));
        }
        if self.broadcast.client_idle_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "broadcast.client_idle_timeout_secs must be > 0".into(),
            ));
        }
        if let Some(target) = &self.initial_target {
            if !Coordinates::new(target.latitude, target.longitude).is_valid() {
                return Err(ConfigError::Invalid(format!(
                    "initial_target '{}' has out-of-range coordinates",
                    target.name
                )));
            }
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        match self.provider.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigError::MissingApiKey),
        }
    }
}

/// Lit un fichier YAML ; absent ou vide -> config par défaut.
pub async fn load_config_from(path: impl AsRef<Path>) -> Result<ServerConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("no config file at {}, using defaults", path.display());
        return Ok(ServerConfig::default());
    }
    let txt = fs::read_to_string(path).await?;
    if txt.trim().is_empty() {
        return Ok(ServerConfig::default());
    }
    Ok(serde_yaml::from_str(&txt)?)
}

/// Chargement complet : fichier ($LALIN_SERVER_CONFIG ou lalin.yaml), puis env, puis validation.
/// Le `.env` doit déjà avoir été chargé par l'appelant.
pub async fn load_config() -> Result<ServerConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut cfg = load_config_from(&path).await?;
    cfg.apply_env_overrides(|name| std::env::var(name).ok())?;
    cfg.validate()?;
    Ok(cfg)
}
