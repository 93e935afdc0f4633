use std::io::{self, Write};

use crate::Transcript;
use crate::render::TimestampLink;
use crate::stream::SummaryArtifact;
use crate::summary::{RenderUpdate, SummarySink, UsageState};
use crate::timestamp;
use crate::tracks::CaptionTrack;

/// Render transcript as plain text (one segment per line, no timestamps)
pub fn render_text(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render transcript with an `m:ss` clock in front of every segment
pub fn render_timed(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .map(|s| format!("[{}] {}", timestamp::format_clock(s.start), s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_json(transcript: &Transcript) -> serde_json::Result<String> {
    serde_json::to_string_pretty(transcript)
}

/// Render transcript as SubRip cues
pub fn render_srt(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "{}\n{} --> {}\n{}\n",
                i + 1,
                timestamp::format_srt(s.start),
                timestamp::format_srt(s.start + s.duration),
                s.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per caption track: language, kind, translatability and display name
pub fn render_tracks(tracks: &[CaptionTrack]) -> String {
    tracks
        .iter()
        .map(|t| {
            let translatable = if t.is_translatable { "translatable" } else { "" };
            let line = format!("{:<16} {:<12} {}", t.describe(), translatable, t.name().unwrap_or_default());
            line.trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn upgrade_message(usage: &UsageState) -> String {
    if usage.usage.limit > 0 {
        format!(
            "You've used {} of {} free summaries. Upgrade your plan to keep summarizing.",
            usage.usage.current, usage.usage.limit
        )
    } else {
        "You've reached your free summary limit. Upgrade your plan to keep summarizing.".to_string()
    }
}

/// Writes summary renders to a terminal.
///
/// In live mode every render redraws the previous one in place; otherwise only
/// the last render is printed by [`TerminalSink::finish`].
pub struct TerminalSink<W: Write> {
    out: W,
    live: bool,
    drawn_lines: usize,
    last: String,
    links: Vec<TimestampLink>,
    notes: Vec<String>,
    error: Option<io::Error>,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W, live: bool) -> Self {
        Self {
            out,
            live,
            drawn_lines: 0,
            last: String::new(),
            links: Vec::new(),
            notes: Vec::new(),
            error: None,
        }
    }

    fn write(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            self.error = Some(e);
        }
    }

    fn redraw(&mut self, text: &str) {
        let mut frame = String::new();
        if self.drawn_lines > 0 {
            frame.push_str(&format!("\x1b[{}A\x1b[J", self.drawn_lines));
        }
        frame.push_str(text);
        frame.push('\n');
        self.drawn_lines = text.lines().count().max(1);
        self.write(&frame);
    }

    /// Print whatever is still pending and hand back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.live && !self.last.is_empty() {
            let last = std::mem::take(&mut self.last);
            self.write(&format!("{last}\n"));
        }
        for note in std::mem::take(&mut self.notes) {
            self.write(&format!("\n{note}\n"));
        }
        if !self.links.is_empty() {
            let mut block = String::from("\nLinks:\n");
            for link in &self.links {
                block.push_str(&format!("  {:>8}  {}\n", link.token, link.url));
            }
            self.write(&block);
        }
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self.out),
        }
    }
}

impl<W: Write> SummarySink for TerminalSink<W> {
    fn render(&mut self, update: &RenderUpdate<'_>) {
        self.links.extend(update.new_links.iter().map(|link| (*link).clone()));
        let text = update.view.to_text();
        if self.live {
            self.redraw(&text);
        }
        self.last = text;
    }

    fn upgrade(&mut self, usage: &UsageState) {
        let message = upgrade_message(usage);
        self.write(&format!("{message}\n"));
    }

    fn note(&mut self, message: &str) {
        self.notes.push(message.to_string());
    }

    fn completed(&mut self, artifact: &SummaryArtifact) {
        log::debug!("Summary complete ({} bytes)", artifact.text().len());
    }
}
