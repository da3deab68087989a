//! `CONFIDENCE: <0..1>` marker handling for model output.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

/// Used when the model omits the marker.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)CONFIDENCE:\s*(0?\.\d+|1\.0+|0|1)\b\.?").expect("confidence regex")
    })
}

/// Answer text with the marker removed, plus the parsed confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedConfidence {
    pub answer: String,
    pub confidence: f32,
    pub marker_found: bool,
}

/// Split the trailing confidence marker from a model reply.
///
/// The last marker wins and is clamped to [0, 1]. Without one the
/// confidence is [`DEFAULT_CONFIDENCE`].
pub fn parse_confidence(text: &str) -> ParsedConfidence {
    let re = marker_regex();
    let Some(captures) = re.captures_iter(text).last() else {
        warn!("model reply has no CONFIDENCE marker, using {DEFAULT_CONFIDENCE}");
        return ParsedConfidence {
            answer: text.trim().to_string(),
            confidence: DEFAULT_CONFIDENCE,
            marker_found: false,
        };
    };

    let confidence = captures
        .get(1)
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .map(|value| value.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CONFIDENCE);

    let answer = re.replace_all(text, "").trim().to_string();

    ParsedConfidence {
        answer,
        confidence,
        marker_found: true,
    }
}
