use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::StatusCode;

use crate::error::TranscriptError;
use crate::page::{self, CaptionIndexResolver, EmbeddedJsonResolver};
use crate::tracks::{self, CaptionTrack};
use crate::{Segment, TimedTextFormat, Transcript, VideoId, timedtext};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Below this many JSON3 segments the XML format is fetched as well.
pub const DEFAULT_FALLBACK_THRESHOLD: usize = 10;

/// Where watch pages and timed-text bodies come from.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the watch page, optionally answering a consent interstitial.
    async fn watch_page(&self, video_id: &VideoId, consent: Option<&str>) -> Result<String, TranscriptError>;

    /// Fetch a caption track body.
    async fn timed_text(&self, url: &str) -> Result<String, TranscriptError>;
}

/// [`PageSource`] backed by plain HTTP GETs
#[derive(Debug, Clone, Default)]
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str, consent: Option<&str>) -> Result<String, TranscriptError> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept-Language", "en-US");
        if let Some(token) = consent {
            request = request.header("Cookie", format!("CONSENT=YES+{token}"));
        }

        let resp = request.send().await?;
        match resp.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(TranscriptError::RateLimited),
            status if !status.is_success() => Err(TranscriptError::Http {
                url: url.to_string(),
                status,
            }),
            _ => Ok(resp.text().await?),
        }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn watch_page(&self, video_id: &VideoId, consent: Option<&str>) -> Result<String, TranscriptError> {
        let url = video_id.watch_url();
        debug!("Fetching watch page: {url}");
        self.get(&url, consent).await
    }

    async fn timed_text(&self, url: &str) -> Result<String, TranscriptError> {
        debug!("Fetching timed text: {url}");
        self.get(url, None).await
    }
}

/// Track-selection and fallback knobs
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub preferred_languages: Vec<String>,
    pub fallback_threshold: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            preferred_languages: tracks::default_languages(),
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        }
    }
}

/// Fetches and normalizes the caption transcript of a video.
pub struct TranscriptFetcher<S> {
    source: S,
    resolver: Box<dyn CaptionIndexResolver>,
    options: FetchOptions,
}

impl<S: PageSource> TranscriptFetcher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            resolver: Box::new(EmbeddedJsonResolver),
            options: FetchOptions::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: impl CaptionIndexResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate a raw URL or id, then fetch. Invalid input never reaches the network.
    pub async fn fetch_input(&self, input: &str) -> Result<Transcript, TranscriptError> {
        let video_id = VideoId::from_input(input)?;
        self.fetch(&video_id).await
    }

    pub async fn fetch(&self, video_id: &VideoId) -> Result<Transcript, TranscriptError> {
        let tracks = self.list_tracks(video_id).await?;

        let track = tracks::select_track(&tracks, &self.options.preferred_languages).ok_or_else(|| {
            TranscriptError::NoTranscriptFound {
                video_id: video_id.to_string(),
                requested: self.options.preferred_languages.clone(),
                available: tracks.iter().map(CaptionTrack::describe).collect(),
            }
        })?;
        info!("Using caption track {} for {video_id}", track.describe());

        let (segments, format) = self.fetch_segments(track).await?;
        info!("Transcript for {video_id}: {} segments ({format})", segments.len());

        Ok(Transcript {
            video_id: video_id.clone(),
            language: track.language_code.clone(),
            generated: track.is_generated(),
            format,
            segments,
        })
    }

    /// Caption tracks advertised by the watch page, in page order.
    pub async fn list_tracks(&self, video_id: &VideoId) -> Result<Vec<CaptionTrack>, TranscriptError> {
        let html = self.load_page(video_id).await?;
        let tracks = self.resolver.resolve(video_id, &html)?;
        debug!(
            "Found {} caption tracks: {}",
            tracks.len(),
            tracks.iter().map(CaptionTrack::describe).collect::<Vec<_>>().join(", ")
        );
        Ok(tracks)
    }

    /// Load the watch page, answering at most one consent interstitial.
    async fn load_page(&self, video_id: &VideoId) -> Result<String, TranscriptError> {
        let html = self.source.watch_page(video_id, None).await?;
        if !page::is_consent_page(&html) {
            return Ok(html);
        }

        let token = page::consent_token(&html).ok_or_else(|| TranscriptError::ConsentFailed(video_id.to_string()))?;
        info!("Consent page for {video_id}, retrying with consent cookie");

        let html = self.source.watch_page(video_id, Some(&token)).await?;
        if page::is_consent_page(&html) {
            return Err(TranscriptError::ConsentFailed(video_id.to_string()));
        }
        Ok(html)
    }

    /// JSON3 first; XML only when JSON3 came back short or failed, and only kept if it parsed more.
    /// A failed format counts as zero segments; the fetch fails only when both formats fail.
    async fn fetch_segments(&self, track: &CaptionTrack) -> Result<(Vec<Segment>, TimedTextFormat), TranscriptError> {
        let (json_segments, json_error) = match self.source.timed_text(&format!("{}&fmt=json3", track.base_url)).await {
            Ok(body) => (timedtext::parse_json3(&body), None),
            Err(TranscriptError::RateLimited) => return Err(TranscriptError::RateLimited),
            Err(e) => {
                warn!("JSON3 caption fetch failed, trying XML format: {e}");
                (Vec::new(), Some(e))
            }
        };
        if json_error.is_none() && json_segments.len() >= self.options.fallback_threshold {
            return Ok((json_segments, TimedTextFormat::Json3));
        }

        debug!(
            "JSON3 returned only {} segments, trying XML format",
            json_segments.len()
        );
        let xml_segments = match self.source.timed_text(&track.base_url).await {
            Ok(body) => timedtext::parse_xml(&body),
            Err(TranscriptError::RateLimited) => return Err(TranscriptError::RateLimited),
            Err(e) => match json_error {
                Some(json_error) => {
                    warn!("XML caption fetch failed as well: {e}");
                    return Err(json_error);
                }
                None => {
                    warn!("XML caption fetch failed, keeping JSON3 result: {e}");
                    return Ok((json_segments, TimedTextFormat::Json3));
                }
            },
        };

        if xml_segments.len() > json_segments.len() {
            debug!("Using XML transcript ({} segments)", xml_segments.len());
            Ok((xml_segments, TimedTextFormat::Xml))
        } else {
            Ok((json_segments, TimedTextFormat::Json3))
        }
    }
}

/// Fetch a transcript over HTTP for a URL or bare id.
pub async fn fetch_transcript(
    client: &reqwest::Client,
    input: &str,
    options: FetchOptions,
) -> Result<Transcript, TranscriptError> {
    TranscriptFetcher::new(HttpPageSource::new(client.clone()))
        .with_options(options)
        .fetch_input(input)
        .await
}
