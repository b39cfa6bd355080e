//! Builds the transmitter command line for an item.
//!
//! Every value is a separate argv element; nothing passes through a shell.
//! The title ends up inside a filtergraph, which has its own quoting rules,
//! so it goes through [`escape_drawtext`].

use std::path::{Path, PathBuf};

use super::config::TransmitConfig;
use crate::catalog::Item;

/// Program and arguments for one transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl TransmitInvocation {
    pub fn build(config: &TransmitConfig, sink_url: &str, item: &Item) -> Self {
        let profile = &config.profile;
        let mut args: Vec<String> = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            config.ffmpeg_log_level.clone(),
        ];

        if profile.realtime {
            args.push("-re".to_string());
        }

        args.extend([
            "-fflags".to_string(),
            "+genpts".to_string(),
            "-rtbufsize".to_string(),
            profile.rtbufsize.clone(),
            "-probesize".to_string(),
            profile.probesize.clone(),
            "-analyzeduration".to_string(),
            profile.analyzeduration_us.to_string(),
            "-i".to_string(),
            item.source.clone(),
            "-i".to_string(),
            config.overlay_path.to_string_lossy().to_string(),
            "-filter_complex".to_string(),
            filter_graph(config, &item.title),
        ]);

        // Video
        args.extend([
            "-c:v".to_string(),
            profile.video_codec.clone(),
            "-preset".to_string(),
            profile.preset.clone(),
        ]);
        if let Some(tune) = &profile.tune {
            args.extend(["-tune".to_string(), tune.clone()]);
        }
        args.extend([
            "-b:v".to_string(),
            format!("{}k", profile.video_bitrate_kbps),
        ]);
        if let Some(crf) = profile.crf {
            args.extend(["-crf".to_string(), crf.to_string()]);
        }
        args.extend([
            "-maxrate".to_string(),
            format!("{}k", profile.maxrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", profile.bufsize_kbps),
            "-pix_fmt".to_string(),
            profile.pix_fmt.clone(),
            "-g".to_string(),
            profile.gop.to_string(),
        ]);

        // Audio
        args.extend([
            "-c:a".to_string(),
            profile.audio_codec.clone(),
            "-b:a".to_string(),
            format!("{}k", profile.audio_bitrate_kbps),
            "-ar".to_string(),
            profile.audio_sample_rate.to_string(),
        ]);

        args.extend(config.extra_args.iter().cloned());

        args.extend([
            "-f".to_string(),
            profile.output_format.clone(),
            sink_url.to_string(),
        ]);

        Self {
            program: config.ffmpeg_path.clone(),
            args,
        }
    }

    /// Command line with the sink replaced, safe to log.
    pub fn redacted(&self, sink_url: &str) -> String {
        let args: Vec<&str> = self
            .args
            .iter()
            .map(|arg| if arg == sink_url { "<sink>" } else { arg.as_str() })
            .collect();
        format!("{} {}", self.program.display(), args.join(" "))
    }
}

/// Overlay scaled to the item, then the title label on top.
fn filter_graph(config: &TransmitConfig, title: &str) -> String {
    let mut graph = "[0:v][1:v]scale2ref[v0][v1];[v0][v1]overlay=0:0".to_string();
    let label = &config.label;
    if label.enabled {
        graph.push_str(&format!(
            ",drawtext=expansion=none:text={}:fontcolor={}:fontsize={}:x={}:y={}",
            escape_drawtext(title),
            label.font_color,
            label.font_size,
            label.x,
            label.y
        ));
        if let Some(font) = &label.font_file {
            graph.push_str(&format!(":fontfile={}", escape_path(font)));
        }
    }
    graph
}

/// Escape text for use as a drawtext option value inside a filtergraph.
///
/// ffmpeg unescapes twice: once when splitting the filtergraph into filters
/// and once when splitting the filter arguments into `key=value` pairs. The
/// value is escaped for the inner level first and the outer level second.
/// Control characters become spaces and surrounding whitespace is trimmed,
/// since unescaped edge whitespace is dropped by the parser anyway.
pub fn escape_drawtext(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let option_level = escape_chars(cleaned.trim(), &['\\', '\'', ':']);
    escape_chars(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

fn escape_path(path: &Path) -> String {
    escape_drawtext(&path.to_string_lossy())
}

fn escape_chars(input: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
