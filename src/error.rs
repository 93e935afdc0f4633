use std::time::Duration;

use thiserror::Error;

/// Coarse failure classes shared by the fetcher and the summary consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    RateLimited,
    SourceUnavailable,
    NoMatchingTranscript,
    NetworkFailure,
    ProtocolViolation,
    UpstreamError,
}

impl ErrorKind {
    /// Whether re-running the whole fetch-then-stream sequence may help.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::NetworkFailure | ErrorKind::UpstreamError
        )
    }
}

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("invalid video id {0:?} (expected 11 characters of [A-Za-z0-9_-] or a YouTube URL)")]
    InvalidVideoId(String),

    #[error("too many requests: YouTube answered with a captcha or 429")]
    RateLimited,

    #[error("video {0} is unavailable")]
    VideoUnavailable(String),

    #[error("transcripts are disabled for video {0}")]
    TranscriptsDisabled(String),

    #[error("could not get past the consent page for video {0}")]
    ConsentFailed(String),

    #[error("no caption data could be extracted from the page of video {0}")]
    NoTranscriptAvailable(String),

    #[error(
        "no transcript for video {video_id} in [{}]; available tracks: [{}]",
        .requested.join(", "),
        .available.join(", ")
    )]
    NoTranscriptFound {
        video_id: String,
        requested: Vec<String>,
        available: Vec<String>,
    },

    #[error("{url} returned {status}")]
    Http { url: String, status: reqwest::StatusCode },

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl TranscriptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscriptError::InvalidVideoId(_) => ErrorKind::InvalidInput,
            TranscriptError::RateLimited => ErrorKind::RateLimited,
            TranscriptError::VideoUnavailable(_)
            | TranscriptError::TranscriptsDisabled(_)
            | TranscriptError::ConsentFailed(_)
            | TranscriptError::NoTranscriptAvailable(_) => ErrorKind::SourceUnavailable,
            TranscriptError::NoTranscriptFound { .. } => ErrorKind::NoMatchingTranscript,
            TranscriptError::Http { .. } | TranscriptError::Network(_) => ErrorKind::NetworkFailure,
        }
    }
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("request timed out after {}s: the server took too long to respond", .0.as_secs())]
    TimedOut(Duration),

    #[error("summary request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error(
        "summary service returned {status}: {}",
        upstream_message(.error, .details)
    )]
    Upstream {
        status: u16,
        error: Option<String>,
        details: Option<String>,
    },

    #[error("summary stream was interrupted before any text arrived ({0}); please try again")]
    Interrupted(String),
}

fn upstream_message<'a>(error: &'a Option<String>, details: &'a Option<String>) -> &'a str {
    details.as_deref().or(error.as_deref()).unwrap_or("request failed")
}

impl SummaryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SummaryError::TimedOut(_) | SummaryError::Network(_) | SummaryError::Interrupted(_) => {
                ErrorKind::NetworkFailure
            }
            SummaryError::Upstream { .. } => ErrorKind::UpstreamError,
        }
    }
}
