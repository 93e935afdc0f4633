//! Newline-delimited JSON records of the summary stream and the text they
//! accumulate into.

use serde::Deserialize;

use crate::error::ErrorKind;

/// One record of the `/summary` response body.
///
/// The service sends `{"cached": true, "summary": ...}`, `{"chunk": ...,
/// "done": false}` and finally `{"chunk": "", "done": true}`; every field is
/// optional so partial shapes still parse.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamRecord {
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub done: bool,
}

/// A line that is not a record. Skipped by the consumer.
#[derive(Debug, thiserror::Error)]
#[error("malformed stream record {line:?}: {source}")]
pub struct RecordError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

impl RecordError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ProtocolViolation
    }
}

pub fn parse_record(line: &str) -> Result<StreamRecord, RecordError> {
    serde_json::from_str(line).map_err(|source| RecordError {
        line: line.to_string(),
        source,
    })
}

/// Reassembles lines from body chunks that may split them anywhere.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Feed a chunk; returns every non-blank line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(|&b| b == b'\n')
            .filter_map(non_blank)
            .collect()
    }

    /// Whatever trailing text never got its newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        non_blank(&rest)
    }
}

fn non_blank(bytes: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(bytes);
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Empty,
    Partial,
    Complete,
    Cached,
}

/// Summary text accumulated by one streaming call.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryArtifact {
    text: String,
    state: ArtifactState,
}

impl Default for SummaryArtifact {
    fn default() -> Self {
        Self {
            text: String::new(),
            state: ArtifactState::Empty,
        }
    }
}

impl SummaryArtifact {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn state(&self) -> ArtifactState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn append(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.text.push_str(chunk);
        self.state = ArtifactState::Partial;
    }

    /// A cached summary replaces anything streamed so far.
    pub fn set_cached(&mut self, summary: String) {
        self.text = summary;
        self.state = ArtifactState::Cached;
    }

    pub fn complete(&mut self) {
        if self.state != ArtifactState::Cached {
            self.state = ArtifactState::Complete;
        }
    }
}
