//! Lalin server: distributes periodic traffic readings to UDP subscribers
//! and lets them steer the monitored location (JOIN / SEARCH / RESET).
//! A `weather` mode broadcasts the BMKG nowcast bulletin instead.

pub mod broadcast;
pub mod commands;
pub mod config;
pub mod models;
pub mod monitor;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod server;
pub mod tomtom;
pub mod transport;
pub mod weather;

pub use broadcast::{broadcast_message, BroadcastLoop, CycleOutcome, FanOut};
pub use commands::{CommandProcessor, Handled};
pub use config::{load_config, ConfigError, ServerConfig, ServerMode};
pub use models::{Bulletin, ClientEndpoint, Coordinates, MonitorTarget, TrafficReading};
pub use monitor::MonitorState;
pub use provider::{DataProvider, ProviderError};
pub use registry::ClientRegistry;
pub use server::Server;
pub use tomtom::TomTomProvider;
pub use transport::Transport;
pub use weather::{BmkgProvider, BulletinSource};
