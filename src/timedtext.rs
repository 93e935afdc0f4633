//! Parsers for the two timed-text wire formats a caption track serves.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::Deserialize;

use crate::Segment;

/// Events without `dDurationMs` are assumed to last this long.
const DEFAULT_EVENT_DURATION_MS: f64 = 1000.0;

static BETWEEN_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").expect("valid whitespace regex"));
static START_ATTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"start="([\d.]+)""#).expect("valid start regex"));
static DUR_ATTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"dur="([\d.]+)""#).expect("valid dur regex"));

#[derive(Debug, Deserialize)]
struct Json3Document {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs", default)]
    t_start_ms: f64,
    #[serde(rename = "dDurationMs")]
    d_duration_ms: Option<f64>,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Parse a `fmt=json3` body. Anything that is not a JSON object yields no
/// segments rather than an error, so the caller can fall back to XML.
pub fn parse_json3(body: &str) -> Vec<Segment> {
    let body = body.trim_start();
    if !body.starts_with('{') {
        debug!("JSON3 body is not an object ({} bytes)", body.len());
        return Vec::new();
    }

    let doc: Json3Document = match serde_json::from_str(body) {
        Ok(doc) => doc,
        Err(e) => {
            debug!("Error parsing JSON3 transcript: {e}");
            return Vec::new();
        }
    };

    doc.events
        .into_iter()
        .filter(|event| !event.segs.is_empty())
        .filter_map(|event| {
            let joined = event.segs.iter().map(|s| s.utf8.as_str()).collect::<Vec<_>>().join(" ");
            let text = html_escape::decode_html_entities(joined.trim()).to_string();
            if text.is_empty() {
                return None;
            }
            Some(Segment {
                text,
                start: (event.t_start_ms / 1000.0).max(0.0),
                duration: (event.d_duration_ms.unwrap_or(DEFAULT_EVENT_DURATION_MS) / 1000.0).max(0.0),
            })
        })
        .collect()
}

/// Parse the default XML timed-text body.
///
/// Works fragment by fragment on `<text ` boundaries so caption bodies that
/// span several lines survive. Only `&amp;`, `&quot;` and `&#39;` are decoded.
pub fn parse_xml(body: &str) -> Vec<Segment> {
    let collapsed = BETWEEN_TAGS.replace_all(body, "><");
    collapsed.split("<text ").skip(1).filter_map(parse_xml_fragment).collect()
}

fn parse_xml_fragment(part: &str) -> Option<Segment> {
    let end_of_tag = part.find('>')?;
    let attributes = &part[..end_of_tag];

    let start = START_ATTR.captures(attributes)?[1].parse::<f64>().ok()?;
    let duration = DUR_ATTR.captures(attributes)?[1].parse::<f64>().ok()?;

    let content = if attributes.ends_with('/') {
        ""
    } else {
        let rest = &part[end_of_tag + 1..];
        rest.find("</text>").map_or(rest, |end| &rest[..end])
    };

    Some(Segment {
        text: decode_xml_entities(content),
        start,
        duration,
    })
}

fn decode_xml_entities(text: &str) -> String {
    text.replace("&amp;", "&").replace("&quot;", "\"").replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json3_basic() {
        let body = serde_json::json!({
            "wireMagic": "pb3",
            "events": [
                {"tStartMs": 0, "dDurationMs": 1500, "segs": [{"utf8": "Hello"}, {"utf8": "world"}]},
                {"tStartMs": 1500, "segs": [{"utf8": "no duration"}]},
                {"tStartMs": 2000, "dDurationMs": 10},
                {"tStartMs": 2500, "dDurationMs": 10, "segs": []},
                {"tStartMs": 3000, "dDurationMs": 500, "segs": [{"utf8": "\n"}]},
                {"tStartMs": 4000, "dDurationMs": 2000, "segs": [{"utf8": "Tom &amp; Jerry"}]}
            ]
        })
        .to_string();

        let segments = parse_json3(&body);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].text, "Hello world");
        assert!((segments[0].start - 0.0).abs() < f64::EPSILON);
        assert!((segments[0].duration - 1.5).abs() < f64::EPSILON);
        assert_eq!(segments[1].text, "no duration");
        assert!((segments[1].duration - 1.0).abs() < f64::EPSILON);
        assert_eq!(segments[2].text, "Tom & Jerry");
        assert!((segments[2].start - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_json3_rejects_non_json() {
        assert!(parse_json3("").is_empty());
        assert!(parse_json3("<?xml version=\"1.0\"?><transcript/>").is_empty());
        assert!(parse_json3("{\"events\": [").is_empty());
        assert!(parse_json3("{}").is_empty());
    }

    #[test]
    fn test_parse_xml_basic() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?>
<transcript>
    <text start="0.21" dur="2.34">Hello world</text>
    <text start="2.55" dur="1.50">This is a test</text>
</transcript>"#;

        let segments = parse_xml(xml);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Hello world");
        assert!((segments[0].start - 0.21).abs() < f64::EPSILON);
        assert!((segments[0].duration - 2.34).abs() < f64::EPSILON);
        assert_eq!(segments[1].text, "This is a test");
    }

    #[test]
    fn test_parse_xml_multiline_body() {
        let xml = "<transcript><text start=\"1\" dur=\"2\">first line\nsecond line</text><text start=\"3\" dur=\"1\">next</text></transcript>";
        let segments = parse_xml(xml);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "first line\nsecond line");
    }

    #[test]
    fn test_parse_xml_decodes_only_three_entities() {
        let xml = r#"<transcript><text start="0.0" dur="1.0">it&amp;#39;s a &quot;test&quot; &lt;b&gt;</text></transcript>"#;
        let segments = parse_xml(xml);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "it's a \"test\" &lt;b&gt;");
    }

    #[test]
    fn test_parse_xml_skips_fragments_missing_attributes() {
        let xml = r#"<transcript><text start="1.0">no dur</text><text dur="1.0">no start</text><text start="2" dur="3"/><text start="4" dur="1">ok</text></transcript>"#;
        let segments = parse_xml(xml);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "");
        assert!((segments[0].start - 2.0).abs() < f64::EPSILON);
        assert_eq!(segments[1].text, "ok");
    }

    #[test]
    fn test_parse_xml_empty() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript></transcript>"#;
        assert!(parse_xml(xml).is_empty());
    }
}
