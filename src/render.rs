//! Tolerant parsing of the summary text into a main point and timestamped
//! highlights. Safe to call on every partial artifact: each call rebuilds the
//! whole view from the accumulated text.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::VideoId;
use crate::timestamp;

const MAIN_POINT_MARKER: &str = "💡 Main Point:";

static MAIN_POINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)💡\s*Main Point:[^\S\n]*\n(.*)").expect("valid main point regex"));
static HIGHLIGHTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)⏱\x{FE0F}?\s*Highlights:[^\S\n]*\n(.*)$").expect("valid highlights regex")
});
static HIGHLIGHT_SECTION_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\n)\s*⏱").expect("valid section regex"));
// `[MM:SS] - text`, optionally wrapped in backticks, optionally with hours.
static HIGHLIGHT_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`?\[([0-9]{1,2}:[0-9]{1,2}(?::[0-9]{1,2})?)\]`?\s*-\s*(.*)").expect("valid highlight regex")
});
static ZERO_HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^00:([0-9]{2}:[0-9]{2})$").expect("valid hours regex"));

/// A timestamp token and where it points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampLink {
    pub token: String,
    pub seconds: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub timestamp: Option<TimestampLink>,
    pub description: String,
}

/// Structured rendering of a (possibly partial) summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryView {
    pub main_point: Option<String>,
    pub highlights: Vec<Highlight>,
    /// Set only when neither section was recognized.
    pub raw: Option<String>,
}

pub fn format_summary(text: &str, video_id: &VideoId) -> SummaryView {
    let text = text.trim();
    if text.is_empty() {
        return SummaryView::default();
    }
    let text = text.find(MAIN_POINT_MARKER).map_or(text, |idx| &text[idx..]);

    let main_point = MAIN_POINT.captures(text).and_then(|caps| {
        let body = caps.get(1).map_or("", |m| m.as_str());
        let body = HIGHLIGHT_SECTION_START.find(body).map_or(body, |m| &body[..m.start()]);
        let body = body.trim();
        (!body.is_empty()).then(|| body.to_string())
    });

    let highlights: Vec<Highlight> = HIGHLIGHTS
        .captures(text)
        .map(|caps| {
            caps[1]
                .trim()
                .split('*')
                .map(str::trim)
                .filter(|point| !point.is_empty())
                .map(|point| parse_highlight(point, video_id))
                .collect()
        })
        .unwrap_or_default();

    let raw = (main_point.is_none() && highlights.is_empty()).then(|| text.to_string());

    SummaryView {
        main_point,
        highlights,
        raw,
    }
}

fn parse_highlight(point: &str, video_id: &VideoId) -> Highlight {
    let Some(caps) = HIGHLIGHT_ROW.captures(point) else {
        return Highlight {
            timestamp: None,
            description: point.to_string(),
        };
    };

    let token = match ZERO_HOURS.captures(&caps[1]) {
        Some(short) => short[1].to_string(),
        None => caps[1].to_string(),
    };
    let description = caps[2].trim().to_string();

    match timestamp::parse_timestamp(&token) {
        Some(seconds) => Highlight {
            timestamp: Some(TimestampLink {
                url: timestamp::deep_link(video_id, seconds),
                token,
                seconds,
            }),
            description,
        },
        None => Highlight {
            timestamp: None,
            description: point.to_string(),
        },
    }
}

impl SummaryView {
    pub fn is_empty(&self) -> bool {
        self.main_point.is_none() && self.highlights.is_empty() && self.raw.is_none()
    }

    pub fn links(&self) -> impl Iterator<Item = &TimestampLink> {
        self.highlights.iter().filter_map(|h| h.timestamp.as_ref())
    }

    /// Plain-text layout for terminals.
    pub fn to_text(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }

        let mut out = String::new();
        if let Some(main) = &self.main_point {
            out.push_str("💡 Main Point\n");
            out.push_str(main);
            out.push('\n');
        }
        if !self.highlights.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("⏱️ Highlights\n");
            for highlight in &self.highlights {
                match &highlight.timestamp {
                    Some(ts) => out.push_str(&format!("  {:>8}  {}\n", ts.token, highlight.description)),
                    None => out.push_str(&format!("  {:>8}  {}\n", "", highlight.description)),
                }
            }
        }
        out.trim_end().to_string()
    }
}

/// Remembers which timestamp tokens already got a link, across re-renders
/// of one artifact.
#[derive(Debug, Default)]
pub struct LinkBinder {
    bound: HashSet<String>,
}

impl LinkBinder {
    /// Links in `view` whose token has not been bound before, in view order.
    pub fn bind<'a>(&mut self, view: &'a SummaryView) -> Vec<&'a TimestampLink> {
        view.links()
            .filter(|link| self.bound.insert(link.token.clone()))
            .collect()
    }
}
