use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    CatalogFile,
    FfmpegPath,
    StreamChunkSize,
    SpawnBackoffMs,
    CancelTimeoutSecs,
    MaxJobDurationSecs,
    JobHistorySecs,
    WatchdogIntervalSecs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::CatalogFile => "CATALOG_FILE",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::StreamChunkSize => "STREAM_CHUNK_SIZE",
            EnvKey::SpawnBackoffMs => "TRANSCODE_SPAWN_BACKOFF_MS",
            EnvKey::CancelTimeoutSecs => "TRANSCODE_CANCEL_TIMEOUT_SECS",
            EnvKey::MaxJobDurationSecs => "TRANSCODE_MAX_DURATION_SECS",
            EnvKey::JobHistorySecs => "TRANSCODE_HISTORY_SECS",
            EnvKey::WatchdogIntervalSecs => "WATCHDOG_INTERVAL_SECS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    get(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
