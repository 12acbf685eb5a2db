use serde::Deserialize;
use utoipa::IntoParams;
use validator::{Validate, ValidationError};

use crate::common::error::AppError;
use crate::modules::transcode::{OutputFormat, TranscodeProfile};

/// Query string of `GET /stream/{asset_id}`.
#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// `yes`, `true` or `1` to transcode instead of serving the file as-is.
    pub transcode: Option<String>,
    /// Player session token, used as the job id. Generated when absent.
    #[validate(custom(function = "validate_job_id"))]
    pub session: Option<String>,
    /// Video codec, e.g. `libx264`.
    #[validate(custom(function = "validate_codec"))]
    pub codec: Option<String>,
    #[validate(custom(function = "validate_codec"))]
    pub audio_codec: Option<String>,
    /// Video bitrate, e.g. `2500k`.
    #[validate(custom(function = "validate_bitrate"))]
    pub bitrate: Option<String>,
    #[validate(custom(function = "validate_bitrate"))]
    pub audio_bitrate: Option<String>,
    #[validate(range(min = 1, max = 8, message = "channels must be between 1 and 8"))]
    pub channels: Option<u8>,
    /// `fmp4` (default) or `hls`.
    pub format: Option<String>,
}

impl StreamQuery {
    pub fn wants_transcode(&self) -> bool {
        self.transcode
            .as_deref()
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "yes" | "true" | "1"))
    }

    /// Default profile with the query's overrides applied.
    pub fn profile(&self) -> Result<TranscodeProfile, AppError> {
        let mut profile = TranscodeProfile::default();
        if let Some(codec) = &self.codec {
            profile.video_codec = codec.clone();
        }
        if let Some(codec) = &self.audio_codec {
            profile.audio_codec = codec.clone();
        }
        if let Some(bitrate) = &self.bitrate {
            profile.video_bitrate = Some(bitrate.clone());
        }
        if let Some(bitrate) = &self.audio_bitrate {
            profile.audio_bitrate = Some(bitrate.clone());
        }
        if let Some(channels) = self.channels {
            profile.audio_channels = Some(channels);
        }
        if let Some(format) = &self.format {
            profile.format = OutputFormat::parse(format)?;
        }
        Ok(profile)
    }
}

fn validate_job_id(value: &str) -> Result<(), ValidationError> {
    let ok = !value.is_empty()
        && value.len() <= 128
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("session")
            .with_message("session must be 1-128 characters of [A-Za-z0-9._-]".into()))
    }
}

fn validate_codec(value: &str) -> Result<(), ValidationError> {
    // Leading '-' would read as an ffmpeg option.
    let ok = value.len() <= 32
        && value.starts_with(|c: char| c.is_ascii_alphanumeric())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("codec").with_message("invalid codec name".into()))
    }
}

fn validate_bitrate(value: &str) -> Result<(), ValidationError> {
    let digits = value.strip_suffix(['k', 'K', 'm', 'M']).unwrap_or(value);
    let ok = !digits.is_empty() && digits.len() <= 9 && digits.chars().all(|c| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("bitrate")
            .with_message("bitrate must look like 128k, 4M or 96000".into()))
    }
}
