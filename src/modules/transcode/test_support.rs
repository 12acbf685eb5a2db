//! Stand-in transcoder binaries for process tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config::settings::TranscodeConfig;
use crate::modules::catalog::MediaAsset;

/// Writes output until killed.
pub const ENDLESS: &str = "exec yes transcoded-bytes";
/// Writes a short payload and exits 0.
pub const FINITE: &str = "printf 'fragment-data'";
/// Complains on stderr and exits 1.
pub const FAILING: &str = "echo 'Invalid data found when processing input' >&2\nexit 1";
/// Copies stdin to stdout.
pub const ECHO_STDIN: &str = "exec cat";
/// Produces nothing for a long time.
pub const SILENT: &str = "exec sleep 30";

pub fn install_fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

pub fn transcode_config(ffmpeg: PathBuf) -> TranscodeConfig {
    TranscodeConfig {
        ffmpeg_path: ffmpeg,
        output_chunk_size: 4096,
        spawn_backoff_ms: 10,
        cancel_timeout_secs: 5,
        ..TranscodeConfig::default()
    }
}

/// A `size`-byte mp4-labelled file under `dir`.
pub fn asset_at(dir: &Path, size: usize) -> MediaAsset {
    let id = Uuid::new_v4();
    let path = dir.join(format!("{}.mp4", id));
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    MediaAsset {
        id,
        file_path: path,
        byte_size: size as u64,
        content_type: "video/mp4".to_string(),
        container: "mp4".to_string(),
    }
}
