//! Scraping of the watch page: consent interstitials and the caption index
//! embedded in the player response.
//!
//! The page layout is undocumented and changes without notice, so all of the
//! text-pattern knowledge lives here behind [`CaptionIndexResolver`].

use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::VideoId;
use crate::error::TranscriptError;
use crate::tracks::CaptionTrack;

const CONSENT_FORM_ACTION: &str = r#"action="https://consent.youtube.com/s""#;
const CAPTCHA_MARKER: &str = r#"class="g-recaptcha""#;
const PLAYABILITY_MARKER: &str = r#""playabilityStatus":"#;

static CONSENT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="v" value="(.*?)""#).expect("valid consent regex"));

/// Turns a watch page into the list of caption tracks it advertises.
pub trait CaptionIndexResolver: Send + Sync {
    fn resolve(&self, video_id: &VideoId, html: &str) -> Result<Vec<CaptionTrack>, TranscriptError>;
}

#[derive(Debug, Deserialize)]
struct PlayerResponse {
    captions: Option<CaptionsData>,
}

#[derive(Debug, Deserialize)]
struct CaptionsData {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    player_captions_tracklist_renderer: Option<CaptionTracklistRenderer>,
}

#[derive(Debug, Deserialize)]
struct CaptionTracklistRenderer {
    #[serde(rename = "captionTracks")]
    caption_tracks: Option<Vec<CaptionTrack>>,
}

/// Reads the `"captions":` object out of the inline player response.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedJsonResolver;

impl CaptionIndexResolver for EmbeddedJsonResolver {
    fn resolve(&self, video_id: &VideoId, html: &str) -> Result<Vec<CaptionTrack>, TranscriptError> {
        let Some((_, after)) = html.split_once(r#""captions":"#) else {
            return Err(diagnose(video_id, html));
        };
        let blob = after.split(r#","videoDetails"#).next().unwrap_or(after).replace('\n', "");

        let captions: CaptionsData = first_json_value(&blob)
            .ok_or_else(|| TranscriptError::NoTranscriptAvailable(video_id.to_string()))?;
        tracks_or_disabled(video_id, Some(captions))
    }
}

/// Reads the whole `ytInitialPlayerResponse = {...};` assignment.
#[derive(Debug, Default, Clone, Copy)]
pub struct InitialPlayerResponseResolver;

impl CaptionIndexResolver for InitialPlayerResponseResolver {
    fn resolve(&self, video_id: &VideoId, html: &str) -> Result<Vec<CaptionTrack>, TranscriptError> {
        let Some((_, after)) = html.split_once("ytInitialPlayerResponse") else {
            return Err(diagnose(video_id, html));
        };
        let Some(open) = after.trim_start().strip_prefix('=') else {
            return Err(TranscriptError::NoTranscriptAvailable(video_id.to_string()));
        };

        let player: PlayerResponse = first_json_value(open.trim_start())
            .ok_or_else(|| TranscriptError::NoTranscriptAvailable(video_id.to_string()))?;
        tracks_or_disabled(video_id, player.captions)
    }
}

/// Deserialize the first JSON value in `text`, ignoring whatever follows it.
fn first_json_value<T: DeserializeOwned>(text: &str) -> Option<T> {
    match serde_json::Deserializer::from_str(text).into_iter::<T>().next() {
        Some(Ok(value)) => Some(value),
        Some(Err(e)) => {
            debug!("Embedded caption JSON did not parse: {e}");
            None
        }
        None => None,
    }
}

fn tracks_or_disabled(video_id: &VideoId, captions: Option<CaptionsData>) -> Result<Vec<CaptionTrack>, TranscriptError> {
    captions
        .and_then(|c| c.player_captions_tracklist_renderer)
        .and_then(|r| r.caption_tracks)
        .filter(|tracks| !tracks.is_empty())
        .ok_or_else(|| TranscriptError::TranscriptsDisabled(video_id.to_string()))
}

/// Explain why a page carries no caption data.
fn diagnose(video_id: &VideoId, html: &str) -> TranscriptError {
    if html.contains(CAPTCHA_MARKER) {
        TranscriptError::RateLimited
    } else if !html.contains(PLAYABILITY_MARKER) {
        TranscriptError::VideoUnavailable(video_id.to_string())
    } else {
        TranscriptError::NoTranscriptAvailable(video_id.to_string())
    }
}

pub fn is_consent_page(html: &str) -> bool {
    html.contains(CONSENT_FORM_ACTION)
}

/// The value to send back as `CONSENT=YES+<token>`.
pub fn consent_token(html: &str) -> Option<String> {
    CONSENT_TOKEN.captures(html).map(|caps| caps[1].to_string())
}
