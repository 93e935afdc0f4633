use serde::Deserialize;

/// Languages tried, in order, when no preference is configured.
pub const DEFAULT_LANGUAGES: [&str; 3] = ["en", "en-US", "en-GB"];

pub fn default_languages() -> Vec<String> {
    DEFAULT_LANGUAGES.iter().map(|s| s.to_string()).collect()
}

/// One caption track as listed in the player response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "languageCode")]
    pub language_code: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    name: Option<TrackName>,
    #[serde(rename = "isTranslatable", default)]
    pub is_translatable: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct TrackName {
    #[serde(rename = "simpleText")]
    simple_text: Option<String>,
    runs: Option<Vec<TextRun>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct TextRun {
    text: String,
}

impl CaptionTrack {
    /// Auto-generated (speech recognized) tracks carry `kind: "asr"`.
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }

    pub fn name(&self) -> Option<String> {
        let name = self.name.as_ref()?;
        name.simple_text.clone().or_else(|| {
            name.runs
                .as_ref()
                .map(|runs| runs.iter().map(|r| r.text.as_str()).collect::<String>())
        })
    }

    /// Short form used in diagnostics, e.g. `en (auto)`.
    pub fn describe(&self) -> String {
        let origin = if self.is_generated() { "auto" } else { "manual" };
        format!("{} ({origin})", self.language_code)
    }
}

/// Pick a track: preferred-language manual, preferred-language generated,
/// first manual, first generated.
pub fn select_track<'a>(tracks: &'a [CaptionTrack], preferred: &[String]) -> Option<&'a CaptionTrack> {
    let (generated, manual): (Vec<&CaptionTrack>, Vec<&CaptionTrack>) =
        tracks.iter().partition(|t| t.is_generated());

    find_preferred(&manual, preferred)
        .or_else(|| find_preferred(&generated, preferred))
        .or_else(|| manual.first().copied())
        .or_else(|| generated.first().copied())
}

fn find_preferred<'a>(tracks: &[&'a CaptionTrack], preferred: &[String]) -> Option<&'a CaptionTrack> {
    preferred.iter().find_map(|code| {
        tracks
            .iter()
            .find(|t| t.language_code.starts_with(code.as_str()))
            .copied()
    })
}
