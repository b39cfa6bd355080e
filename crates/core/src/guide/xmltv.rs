//! JSON now-playing file plus a single-programme XMLTV guide.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use quick_xml::escape::escape;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{GuideError, NowPlaying, ProgramGuide};
use crate::config::GuideConfig;
use crate::history::sync_dir;

const XMLTV_TIME_FORMAT: &str = "%Y%m%d%H%M%S +0000";

/// Writes `now_playing_path` and `epg_path`, each atomically.
pub struct XmltvGuide {
    config: GuideConfig,
}

impl XmltvGuide {
    pub fn new(config: GuideConfig) -> Self {
        Self { config }
    }

    /// Render the XMLTV document for one programme.
    pub fn render(&self, now_playing: &NowPlaying) -> String {
        let start = now_playing.started_at;
        let stop = start + Duration::minutes(i64::from(self.config.programme_minutes));
        let channel_id = escape(self.config.channel_id.as_str());
        let channel_name = escape(self.config.channel_name.as_str());

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<tv>\n");
        xml.push_str(&format!(
            "    <channel id=\"{}\">\n        <display-name>{}</display-name>\n    </channel>\n",
            channel_id, channel_name
        ));
        xml.push_str(&format!(
            "    <programme start=\"{}\" stop=\"{}\" channel=\"{}\">\n",
            format_time(start),
            format_time(stop),
            channel_id
        ));
        xml.push_str(&format!(
            "        <title lang=\"en\">{}</title>\n",
            escape(now_playing.title.as_str())
        ));
        let desc = match &now_playing.description {
            Some(description) => escape(description.as_str()).into_owned(),
            None => format!("Streaming on {}", channel_name),
        };
        xml.push_str(&format!("        <desc>{}</desc>\n", desc));
        xml.push_str(&format!(
            "        <category>{}</category>\n",
            escape(now_playing.category.as_deref().unwrap_or("General"))
        ));
        if let Some(image) = &now_playing.image {
            xml.push_str(&format!("        <icon src=\"{}\" />\n", escape(image.as_str())));
        }
        xml.push_str(&format!(
            "        <url>{}</url>\n",
            escape(now_playing.url.as_str())
        ));
        xml.push_str("    </programme>\n</tv>\n");
        xml
    }
}

#[async_trait]
impl ProgramGuide for XmltvGuide {
    async fn publish(&self, now_playing: &NowPlaying) -> Result<(), GuideError> {
        let mut json = serde_json::to_vec_pretty(now_playing)?;
        json.push(b'\n');
        let xml = self.render(now_playing).into_bytes();

        let json_path = self.config.now_playing_path.clone();
        let epg_path = self.config.epg_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            write_atomic(&json_path, &json)?;
            write_atomic(&epg_path, &xml)
        })
        .await;

        match result {
            Ok(written) => written?,
            Err(e) => {
                return Err(GuideError::Io {
                    path: self.config.epg_path.clone(),
                    error: std::io::Error::other(e),
                })
            }
        }

        debug!(
            title = %now_playing.title,
            epg = %self.config.epg_path.display(),
            "Programme guide updated"
        );
        Ok(())
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format(XMLTV_TIME_FORMAT).to_string()
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), GuideError> {
    let io_err = |error: std::io::Error| GuideError::Io {
        path: path.to_path_buf(),
        error,
    };
    let dir: PathBuf = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(contents).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    if let Err(e) = sync_dir(&dir) {
        debug!(dir = %dir.display(), error = %e, "Directory fsync failed, rename may not be durable");
    }
    Ok(())
}
