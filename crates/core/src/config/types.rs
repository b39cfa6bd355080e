use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::controller::RetryConfig;
use crate::scheduler::SelectionPolicy;
use crate::supervisor::TransmitConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub transmit: TransmitConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub interstitial: Option<InterstitialConfig>,
    #[serde(default)]
    pub guide: Option<GuideConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Catalog source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub reload: ReloadPolicy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            reload: ReloadPolicy::default(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("movies.json")
}

/// When the catalog file is re-read.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// Re-read before every scheduling decision.
    #[default]
    EveryItem,
    /// Re-read only when a rotation completes.
    EveryRotation,
}

/// Play history storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: HistoryBackend,
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::default(),
            path: default_history_path(),
        }
    }
}

fn default_history_path() -> PathBuf {
    PathBuf::from("last_played.json")
}

/// Available history storage backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryBackend {
    #[default]
    Json,
    Sqlite,
}

/// Scheduler configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub policy: SelectionPolicy,
    /// Fixed RNG seed for the random policy (reproducible schedules).
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Channel ident played before every catalog item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterstitialConfig {
    /// Locator of the ident clip.
    pub source: String,
    #[serde(default = "default_interstitial_title")]
    pub title: String,
}

fn default_interstitial_title() -> String {
    "Channel Intro".to_string()
}

/// Programme guide output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuideConfig {
    #[serde(default = "default_now_playing_path")]
    pub now_playing_path: PathBuf,
    #[serde(default = "default_epg_path")]
    pub epg_path: PathBuf,
    #[serde(default = "default_channel")]
    pub channel_id: String,
    #[serde(default = "default_channel")]
    pub channel_name: String,
    /// Nominal length of a guide entry.
    #[serde(default = "default_programme_minutes")]
    pub programme_minutes: u32,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            now_playing_path: default_now_playing_path(),
            epg_path: default_epg_path(),
            channel_id: default_channel(),
            channel_name: default_channel(),
            programme_minutes: default_programme_minutes(),
        }
    }
}

fn default_now_playing_path() -> PathBuf {
    PathBuf::from("current_movie.json")
}

fn default_epg_path() -> PathBuf {
    PathBuf::from("epg.xml")
}

fn default_channel() -> String {
    "playout".to_string()
}

fn default_programme_minutes() -> u32 {
    120
}

/// Status API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Sanitized config for API responses (sink credentials redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub catalog: CatalogConfig,
    pub history: HistoryConfig,
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub transmit: SanitizedTransmitConfig,
    pub interstitial: Option<InterstitialConfig>,
    pub guide: Option<GuideConfig>,
    pub server: ServerConfig,
}

/// Transmit section without the stream key
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTransmitConfig {
    pub ffmpeg_path: PathBuf,
    pub overlay_path: PathBuf,
    pub sink_configured: bool,
    /// Scheme and host of the sink, e.g. `rtmp://live.example.com`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_host: Option<String>,
}

/// Reduces a sink URL to `scheme://host[:port]`, dropping application path,
/// query and fragment; any of them may carry the stream key.
fn sink_host(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    if host.is_empty() {
        return None;
    }
    Some(format!("{}://{}", scheme, host))
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let sink = config
            .transmit
            .sink_url
            .as_deref()
            .filter(|s| !s.trim().is_empty());

        Self {
            catalog: config.catalog.clone(),
            history: config.history.clone(),
            scheduler: config.scheduler.clone(),
            retry: config.retry.clone(),
            transmit: SanitizedTransmitConfig {
                ffmpeg_path: config.transmit.ffmpeg_path.clone(),
                overlay_path: config.transmit.overlay_path.clone(),
                sink_configured: sink.is_some(),
                sink_host: sink.and_then(sink_host),
            },
            interstitial: config.interstitial.clone(),
            guide: config.guide.clone(),
            server: config.server.clone(),
        }
    }
}
