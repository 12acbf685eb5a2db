use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use crate::config::env::{self, EnvKey};

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub catalog_file: PathBuf,
    pub transcode: TranscodeConfig,
    pub stream_chunk_size: usize,
    pub watchdog_interval_secs: u64,
}

/// Knobs for the transcoder supervisor and its watchdog.
#[derive(Clone, Debug, Deserialize)]
pub struct TranscodeConfig {
    pub ffmpeg_path: PathBuf,
    pub output_chunk_size: usize,
    pub spawn_backoff_ms: u64,
    pub cancel_timeout_secs: u64,
    /// Zero disables the server-enforced job lifetime.
    pub max_job_duration_secs: u64,
    pub history_secs: u64,
}

impl TranscodeConfig {
    pub fn spawn_backoff(&self) -> Duration {
        Duration::from_millis(self.spawn_backoff_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_secs(self.cancel_timeout_secs)
    }

    pub fn max_job_duration(&self) -> Option<Duration> {
        (self.max_job_duration_secs > 0).then(|| Duration::from_secs(self.max_job_duration_secs))
    }

    pub fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_secs)
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            output_chunk_size: DEFAULT_CHUNK_SIZE,
            spawn_backoff_ms: 250,
            cancel_timeout_secs: 5,
            max_job_duration_secs: 0,
            history_secs: 3600,
        }
    }
}

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

impl AppConfig {
    pub fn new() -> Self {
        let defaults = TranscodeConfig::default();
        let chunk_size = env::get_parsed(EnvKey::StreamChunkSize, DEFAULT_CHUNK_SIZE).max(1);

        Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get_opt(EnvKey::DatabaseUrl),
            catalog_file: PathBuf::from(env::get_or(EnvKey::CatalogFile, "catalog.json")),
            transcode: TranscodeConfig {
                ffmpeg_path: PathBuf::from(env::get_or(EnvKey::FfmpegPath, "ffmpeg")),
                output_chunk_size: chunk_size,
                spawn_backoff_ms: env::get_parsed(EnvKey::SpawnBackoffMs, defaults.spawn_backoff_ms),
                cancel_timeout_secs: env::get_parsed(EnvKey::CancelTimeoutSecs, defaults.cancel_timeout_secs),
                max_job_duration_secs: env::get_parsed(EnvKey::MaxJobDurationSecs, defaults.max_job_duration_secs),
                history_secs: env::get_parsed(EnvKey::JobHistorySecs, defaults.history_secs),
            },
            stream_chunk_size: chunk_size,
            watchdog_interval_secs: env::get_parsed(EnvKey::WatchdogIntervalSecs, 30).max(1),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            database_url: None,
            catalog_file: PathBuf::from("catalog.json"),
            transcode: TranscodeConfig::default(),
            stream_chunk_size: DEFAULT_CHUNK_SIZE,
            watchdog_interval_secs: 30,
        }
    }
}
