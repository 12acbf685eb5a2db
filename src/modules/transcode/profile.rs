use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::common::error::AppError;

/// Streamable container the transcoder writes to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Fragmented MP4 (`empty_moov`), playable before the encode finishes.
    FragmentedMp4,
    /// MPEG-TS, the container HLS segments are cut from.
    Hls,
}

impl OutputFormat {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.to_ascii_lowercase().as_str() {
            "fmp4" | "mp4" | "fragmented-mp4" => Ok(OutputFormat::FragmentedMp4),
            "hls" | "ts" | "mpegts" => Ok(OutputFormat::Hls),
            other => Err(AppError::bad_request(format!(
                "unsupported output format '{}'",
                other
            ))),
        }
    }

    pub fn content_type(&self, audio_only: bool) -> &'static str {
        match (self, audio_only) {
            (OutputFormat::FragmentedMp4, false) => "video/mp4",
            (OutputFormat::FragmentedMp4, true) => "audio/mp4",
            (OutputFormat::Hls, _) => "video/mp2t",
        }
    }

    fn muxer_args(&self) -> &'static [&'static str] {
        match self {
            OutputFormat::FragmentedMp4 => &[
                "-movflags",
                "frag_keyframe+empty_moov+default_base_moof",
                "-f",
                "mp4",
            ],
            OutputFormat::Hls => &["-f", "mpegts"],
        }
    }
}

/// Where the transcoder reads its input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputArg<'a> {
    /// Let ffmpeg open (and seek in) the file itself.
    File(&'a str),
    /// Bytes arrive on stdin.
    Stdin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeProfile {
    pub video_codec: String,
    pub audio_codec: String,
    pub video_bitrate: Option<String>,
    pub audio_bitrate: Option<String>,
    pub audio_channels: Option<u8>,
    pub format: OutputFormat,
}

impl Default for TranscodeProfile {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            video_bitrate: None,
            audio_bitrate: Some("192k".to_string()),
            audio_channels: Some(2),
            format: OutputFormat::FragmentedMp4,
        }
    }
}

impl TranscodeProfile {
    /// Full ffmpeg argument list, output always on stdout.
    pub fn ffmpeg_args(&self, input: InputArg<'_>, audio_only: bool) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

        match input {
            InputArg::File(path) => {
                args.push("-nostdin".into());
                args.extend(["-i".into(), path.to_string()]);
            }
            InputArg::Stdin => args.extend(["-i".into(), "pipe:0".into()]),
        }

        if audio_only {
            args.push("-vn".into());
        } else {
            args.extend(["-c:v".into(), self.video_codec.clone()]);
            if matches!(self.video_codec.as_str(), "libx264" | "libx265") {
                args.extend(["-preset".into(), "veryfast".into()]);
            }
            if let Some(bitrate) = &self.video_bitrate {
                args.extend(["-b:v".into(), bitrate.clone()]);
            }
        }

        args.extend(["-c:a".into(), self.audio_codec.clone()]);
        if let Some(bitrate) = &self.audio_bitrate {
            args.extend(["-b:a".into(), bitrate.clone()]);
        }
        if let Some(channels) = self.audio_channels {
            args.extend(["-ac".into(), channels.to_string()]);
        }

        args.extend(self.format.muxer_args().iter().map(|s| s.to_string()));
        args.push("pipe:1".into());
        args
    }

    pub fn content_type(&self, audio_only: bool) -> &'static str {
        self.format.content_type(audio_only)
    }
}
