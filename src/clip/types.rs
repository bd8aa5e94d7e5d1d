use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reserved audio field value that selects a muted tone generator
pub const SILENCE_TOKEN: &str = "s";

/// Where a clip's audio comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Decode this file
    File(PathBuf),

    /// Muted tone generator; nothing is decoded and no file is opened
    Silence,
}

impl AudioSource {
    /// Parse a raw audio field. Empty means no audio branch at all.
    pub fn parse(field: &str) -> Option<Self> {
        match field {
            "" => None,
            SILENCE_TOKEN => Some(Self::Silence),
            path => Some(Self::File(PathBuf::from(path))),
        }
    }

    pub fn is_silence(&self) -> bool {
        matches!(self, Self::Silence)
    }

    /// Path of the file to decode, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Silence => None,
        }
    }
}

/// One unit of scheduled playback.
///
/// Immutable once created; the sequencer consumes each descriptor exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipDescriptor {
    /// Video or still image to show
    pub video: Option<PathBuf>,

    /// Audio to play alongside
    pub audio: Option<AudioSource>,

    /// Requested playback duration in milliseconds (0 = until end-of-stream)
    pub duration_ms: u64,
}

impl ClipDescriptor {
    pub fn new(video: Option<PathBuf>, audio: Option<AudioSource>, duration_ms: u64) -> Self {
        Self {
            video,
            audio,
            duration_ms,
        }
    }

    /// Build a descriptor from raw string fields, where empty strings mean "absent"
    pub fn from_fields(video: &str, audio: &str, duration_ms: u64) -> Self {
        let video = (!video.is_empty()).then(|| PathBuf::from(video));
        Self::new(video, AudioSource::parse(audio), duration_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// A clip with neither video nor audio has nothing to play
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

impl fmt::Display for ClipDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let video = self
            .video
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let audio = match &self.audio {
            Some(AudioSource::File(p)) => p.display().to_string(),
            Some(AudioSource::Silence) => SILENCE_TOKEN.to_string(),
            None => String::new(),
        };
        write!(
            f,
            "video = \"{}\", audio = \"{}\", duration = {}",
            video, audio, self.duration_ms
        )
    }
}
