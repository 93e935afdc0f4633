pub mod config;
pub mod error;
pub mod output;
pub mod page;
pub mod render;
pub mod stream;
pub mod summary;
pub mod timedtext;
pub mod timestamp;
pub mod tracks;
pub mod youtube;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use error::{ErrorKind, SummaryError, TranscriptError};

const ID_CHARS: &str = r"[a-zA-Z0-9_-]{11}";

static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(&format!("^{ID_CHARS}$")).expect("valid id regex"));

// Each pattern captures the id and requires it to end at a non-id character.
static URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"youtube\.com/watch\?(?:[^#]*&)?v=",
        r"youtu\.be/",
        r"youtube\.com/embed/",
        r"youtube\.com/shorts/",
    ]
    .iter()
    .map(|prefix| Regex::new(&format!("{prefix}({ID_CHARS})(?:[^a-zA-Z0-9_-]|$)")).expect("valid url regex"))
    .collect()
});

/// An 11-character video identifier that has passed the shape check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    /// Accept a bare id only; anything else is an `InvalidVideoId` error.
    pub fn parse(candidate: &str) -> Result<Self, TranscriptError> {
        if BARE_ID.is_match(candidate) {
            Ok(VideoId(candidate.to_string()))
        } else {
            Err(TranscriptError::InvalidVideoId(candidate.to_string()))
        }
    }

    /// Accept any supported URL shape or a bare id.
    pub fn from_input(input: &str) -> Result<Self, TranscriptError> {
        extract_video_id(input).ok_or_else(|| TranscriptError::InvalidVideoId(input.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for VideoId {
    type Err = TranscriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VideoId::parse(s)
    }
}

impl TryFrom<String> for VideoId {
    type Error = TranscriptError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VideoId::parse(&value)
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

/// A single timed caption segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

/// Wire format the segments were parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimedTextFormat {
    Json3,
    Xml,
}

/// Normalized transcript for a video
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub video_id: VideoId,
    pub language: String,
    pub generated: bool,
    pub format: TimedTextFormat,
    pub segments: Vec<Segment>,
}

impl std::fmt::Display for TimedTextFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimedTextFormat::Json3 => write!(f, "json3"),
            TimedTextFormat::Xml => write!(f, "xml"),
        }
    }
}

/// Extract video ID from various YouTube URL formats
pub fn extract_video_id(input: &str) -> Option<VideoId> {
    let input = input.trim();

    if BARE_ID.is_match(input) {
        return Some(VideoId(input.to_string()));
    }

    URL_PATTERNS
        .iter()
        .find_map(|re| re.captures(input))
        .map(|caps| VideoId(caps[1].to_string()))
}
