//! Configuration for the transmission supervisor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How items are transmitted to the live sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Ingest address including the stream key. Falls back to `RTMP_URL`.
    #[serde(default)]
    pub sink_url: Option<String>,

    /// Image composited over every item.
    #[serde(default = "default_overlay_path")]
    pub overlay_path: PathBuf,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Seconds to wait after SIGTERM before killing the transmitter.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    #[serde(default)]
    pub profile: EncodingProfile,

    #[serde(default)]
    pub label: LabelStyle,

    /// Additional output arguments, inserted before the sink.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_overlay_path() -> PathBuf {
    PathBuf::from("overlay.png")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stop_grace_secs() -> u64 {
    5
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            sink_url: None,
            overlay_path: default_overlay_path(),
            ffmpeg_log_level: default_log_level(),
            stop_grace_secs: default_stop_grace_secs(),
            profile: EncodingProfile::default(),
            label: LabelStyle::default(),
            extra_args: Vec::new(),
        }
    }
}

/// Input pacing and output encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingProfile {
    /// Read input at native frame rate (`-re`).
    pub realtime: bool,
    pub rtbufsize: String,
    pub probesize: String,
    pub analyzeduration_us: u64,
    pub video_codec: String,
    pub preset: String,
    pub tune: Option<String>,
    pub video_bitrate_kbps: u32,
    pub crf: Option<u8>,
    pub maxrate_kbps: u32,
    pub bufsize_kbps: u32,
    pub pix_fmt: String,
    /// Keyframe interval in frames.
    pub gop: u32,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
    pub audio_sample_rate: u32,
    /// Container format for the sink (`-f`).
    pub output_format: String,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            realtime: true,
            rtbufsize: "32M".to_string(),
            probesize: "1M".to_string(),
            analyzeduration_us: 500_000,
            video_codec: "libx264".to_string(),
            preset: "fast".to_string(),
            tune: Some("film".to_string()),
            video_bitrate_kbps: 4000,
            crf: Some(23),
            maxrate_kbps: 4500,
            bufsize_kbps: 6000,
            pix_fmt: "yuv420p".to_string(),
            gop: 50,
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 192,
            audio_sample_rate: 48_000,
            output_format: "flv".to_string(),
        }
    }
}

/// On-screen title label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelStyle {
    pub enabled: bool,
    pub font_color: String,
    pub font_size: u32,
    pub x: u32,
    pub y: u32,
    /// Font for the label; ffmpeg's fontconfig default when unset.
    pub font_file: Option<PathBuf>,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            enabled: true,
            font_color: "white".to_string(),
            font_size: 24,
            x: 20,
            y: 20,
            font_file: None,
        }
    }
}
