//! Programme guide output.
//!
//! After a transmission is confirmed started, the guide publishes what is on
//! air for external consumers (web page widgets, IPTV middleware).

mod xmltv;

pub use xmltv::XmltvGuide;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::Item;

/// Errors raised while publishing guide documents.
#[derive(Debug, Error)]
pub enum GuideError {
    #[error("failed to write {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("failed to serialize now-playing document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The now-playing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl NowPlaying {
    pub fn new(item: &Item, started_at: DateTime<Utc>) -> Self {
        Self {
            title: item.title.clone(),
            url: item.source.clone(),
            category: item.meta("category").map(str::to_string),
            image: item.meta("image").map(str::to_string),
            description: item.meta("description").map(str::to_string),
            started_at,
        }
    }
}

/// Publishes what is currently on air.
#[async_trait]
pub trait ProgramGuide: Send + Sync {
    async fn publish(&self, now_playing: &NowPlaying) -> Result<(), GuideError>;
}
