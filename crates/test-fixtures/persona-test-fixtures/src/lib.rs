//! Shared fixture access for Persona tests: speech marks, viseme maps and clips
//! listed in `fixtures/manifest.json` at the workspace root.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "speech-marks")]
    speech_marks: HashMap<String, SpeechMarkEntry>,
    #[serde(rename = "viseme-maps")]
    viseme_maps: HashMap<String, String>,
    clips: HashMap<String, String>,
}

/// Either a bare path or a path plus the audio length the marks were cut from.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpeechMarkEntry {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        audio_ms: Option<f64>,
    },
}

impl SpeechMarkEntry {
    fn as_path(&self) -> &str {
        match self {
            SpeechMarkEntry::Path(path) => path,
            SpeechMarkEntry::Detailed { path, .. } => path,
        }
    }

    fn audio_ms(&self) -> Option<f64> {
        match self {
            SpeechMarkEntry::Path(_) => None,
            SpeechMarkEntry::Detailed { audio_ms, .. } => *audio_ms,
        }
    }
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

/// Polly-style JSON-lines speech mark streams.
pub mod speech_marks {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.speech_marks.keys().cloned().collect()
    }

    /// Raw JSON-lines text.
    pub fn text(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.speech_marks, "speech mark", name)?;
        read_to_string(entry.as_path())
    }

    /// Length of the recording the marks belong to, when the manifest records it.
    pub fn audio_ms(name: &str) -> Result<Option<f64>> {
        let entry = lookup(&MANIFEST.speech_marks, "speech mark", name)?;
        Ok(entry.audio_ms())
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let entry = lookup(&MANIFEST.speech_marks, "speech mark", name)?;
        Ok(resolve_path(entry.as_path()))
    }
}

pub mod viseme_maps {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.viseme_maps.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.viseme_maps, "viseme map", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.viseme_maps, "viseme map", name)?;
        super::load_json(rel)
    }
}

pub mod clips {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.clips.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.clips, "clip", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.clips, "clip", name)?;
        super::load_json(rel)
    }
}
