//! Timed viseme marks and Polly speech-mark parsing.

use persona_host_core::{HostError, Result};
use serde::{Deserialize, Serialize};

use crate::viseme::VisemeMap;

/// One viseme at a point on the audio timeline (milliseconds).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeechMark {
    #[serde(rename = "time")]
    pub time_ms: f64,
    #[serde(rename = "value")]
    pub viseme: String,
    #[serde(rename = "duration", default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

impl SpeechMark {
    pub fn new(time_ms: f64, viseme: impl Into<String>) -> Self {
        Self {
            time_ms,
            viseme: viseme.into(),
            duration_ms: None,
        }
    }

    #[inline]
    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// A validated mark with its viseme resolved to a canonical map id.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledMark {
    pub mark: SpeechMark,
    pub viseme: String,
}

impl ScheduledMark {
    #[inline]
    pub fn time_ms(&self) -> f64 {
        self.mark.time_ms
    }
}

#[derive(Deserialize)]
struct PollyLine {
    time: f64,
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(default)]
    duration: Option<f64>,
}

/// Parse Polly JSON-lines output, keeping only `"type": "viseme"` entries.
/// Blank lines are skipped; a malformed line is a `Parse` error naming its
/// line number.
pub fn parse_polly_marks(text: &str) -> Result<Vec<SpeechMark>> {
    let mut marks = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed: PollyLine = serde_json::from_str(line).map_err(|e| HostError::Parse {
            reason: format!("speech mark line {}: {}", index + 1, e),
        })?;
        if parsed.kind == "viseme" {
            marks.push(SpeechMark {
                time_ms: parsed.time,
                viseme: parsed.value,
                duration_ms: parsed.duration,
            });
        }
    }
    Ok(marks)
}

fn invalid(index: usize, reason: impl std::fmt::Display) -> HostError {
    HostError::Parse {
        reason: format!("speech mark {index}: {reason}"),
    }
}

/// Validate `marks` against `map` and sort them by time. Equal timestamps keep
/// their input order.
pub fn schedule_marks(marks: &[SpeechMark], map: &VisemeMap) -> Result<Vec<ScheduledMark>> {
    let mut scheduled = Vec::with_capacity(marks.len());
    for (index, mark) in marks.iter().enumerate() {
        if !mark.time_ms.is_finite() || mark.time_ms < 0.0 {
            return Err(invalid(index, format!("invalid time {}", mark.time_ms)));
        }
        if let Some(duration) = mark.duration_ms {
            if !duration.is_finite() || duration < 0.0 {
                return Err(invalid(index, format!("invalid duration {duration}")));
            }
        }
        if mark.viseme.is_empty() {
            return Err(invalid(index, "empty viseme"));
        }
        let viseme = map
            .resolve(&mark.viseme)
            .ok_or_else(|| HostError::not_found("viseme", mark.viseme.as_str()))?;
        scheduled.push(ScheduledMark {
            mark: mark.clone(),
            viseme: viseme.to_string(),
        });
    }
    scheduled.sort_by(|a, b| a.time_ms().total_cmp(&b.time_ms()));
    Ok(scheduled)
}
