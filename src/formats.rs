use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One translated chunk of a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub chapter_name: String,
    pub vi_text: String,
    pub en_text: String,
    pub audio_filename: String,
}

/// One `chapters.json` entry, `{slug, name}`.
///
/// Held as raw JSON so entries with unexpected shapes (a numeric name, extra
/// keys) are listed and rewritten unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterIndexEntry(Value);

impl ChapterIndexEntry {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self(serde_json::json!({ "slug": slug.into(), "name": name.into() }))
    }

    pub fn slug(&self) -> Option<&str> {
        self.0.get("slug")?.as_str()
    }

    /// The display name; non-string names are rendered as JSON text.
    pub fn name(&self) -> Option<String> {
        match self.0.get("name")? {
            Value::Null => None,
            Value::String(name) => Some(name.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for ChapterIndexEntry {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Content of a chapter file or of an upsert payload.
///
/// Writers always produce `Many`; `One` covers legacy files holding a bare
/// object (or any other non-list value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredRecord {
    Many(Vec<Value>),
    One(Value),
}

impl StoredRecord {
    /// Coerces the record into a sequence, wrapping a lone value.
    ///
    /// An empty object counts as an empty sequence, matching how the PHP
    /// frontend's associative decoding reads `{}`.
    pub fn normalize(self) -> Vec<Value> {
        match self {
            Self::Many(items) => items,
            Self::One(Value::Object(map)) if map.is_empty() => Vec::new(),
            Self::One(item) => vec![item],
        }
    }
}

impl From<Value> for StoredRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Many(items),
            other => Self::One(other),
        }
    }
}

/// Result of a lookup; `exists == false` always carries an empty `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lookup {
    pub exists: bool,
    pub data: Vec<Value>,
}

impl Lookup {
    pub fn missing() -> Self {
        Self {
            exists: false,
            data: Vec::new(),
        }
    }

    /// Interprets `data` as segments; the error carries the offending payload.
    pub fn segments(&self) -> Result<Vec<Segment>, serde_json::Error> {
        segments_from_values(&self.data)
    }
}

pub fn segments_from_values(values: &[Value]) -> Result<Vec<Segment>, serde_json::Error> {
    values
        .iter()
        .map(|value| Segment::deserialize(value))
        .collect()
}

/// Wire body of an upsert (`POST /upsert`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertRequest {
    #[serde(default)]
    pub chapter_name: String,
    #[serde(default)]
    pub json_data: Option<StoredRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_filename: Option<String>,
}

impl UpsertRequest {
    pub fn new(chapter_name: impl Into<String>, segments: &[Segment]) -> serde_json::Result<Self> {
        let items = segments
            .iter()
            .map(serde_json::to_value)
            .collect::<serde_json::Result<Vec<_>>>()?;
        Ok(Self {
            chapter_name: chapter_name.into(),
            json_data: Some(StoredRecord::Many(items)),
            audio_data: None,
            audio_filename: None,
        })
    }

    pub fn with_audio(mut self, audio_base64: String, filename: impl Into<String>) -> Self {
        self.audio_data = Some(audio_base64);
        self.audio_filename = Some(filename.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub json_path: String,
    pub audio_path: Option<String>,
}
