use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Absolute path of the backing PDF.
pub const FILE_FIELD: &str = "file";
/// Stored digest used for change detection.
pub const FINGERPRINT_FIELD: &str = "fingerprint";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryType {
    Article,
    Book,
    Booklet,
    InBook,
    InCollection,
    InProceedings,
    Conference,
    Manual,
    MastersThesis,
    PhdThesis,
    Proceedings,
    TechReport,
    Unpublished,
    Online,
    Misc,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Book => "book",
            Self::Booklet => "booklet",
            Self::InBook => "inbook",
            Self::InCollection => "incollection",
            Self::InProceedings => "inproceedings",
            Self::Conference => "conference",
            Self::Manual => "manual",
            Self::MastersThesis => "mastersthesis",
            Self::PhdThesis => "phdthesis",
            Self::Proceedings => "proceedings",
            Self::TechReport => "techreport",
            Self::Unpublished => "unpublished",
            Self::Online => "online",
            Self::Misc => "misc",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let out = match s.trim().to_ascii_lowercase().as_str() {
            "article" => Self::Article,
            "book" => Self::Book,
            "booklet" => Self::Booklet,
            "inbook" => Self::InBook,
            "incollection" => Self::InCollection,
            "inproceedings" => Self::InProceedings,
            "conference" => Self::Conference,
            "manual" => Self::Manual,
            "mastersthesis" => Self::MastersThesis,
            "phdthesis" => Self::PhdThesis,
            "proceedings" => Self::Proceedings,
            "techreport" => Self::TechReport,
            "unpublished" => Self::Unpublished,
            "online" | "electronic" | "www" => Self::Online,
            "misc" => Self::Misc,
            other => return Err(format!("unknown entry type `{other}`")),
        };
        Ok(out)
    }
}

impl Serialize for EntryType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntryType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered, case-insensitive field bag. Names are stored lowercased; insertion
/// order is kept for display only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or overwrite in place, keeping the original position.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let name = name.trim().to_ascii_lowercase();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct FieldMapVisitor;

impl<'de> Visitor<'de> for FieldMapVisitor {
    type Value = FieldMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of field names to string values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut out = FieldMap::new();
        while let Some((name, value)) = access.next_entry::<String, FieldValue>()? {
            out.insert(&name, value.0);
        }
        Ok(out)
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// Accepts numbers as well as strings (`"year": 2020`).
struct FieldValue(String);

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(Self(s)),
            serde_json::Value::Number(n) => Ok(Self(n.to_string())),
            serde_json::Value::Bool(b) => Ok(Self(b.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "field values must be strings, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibRecord {
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub key: String,
    #[serde(default)]
    pub fields: FieldMap,
}

impl BibRecord {
    pub fn new(entry_type: EntryType, key: impl Into<String>) -> Self {
        Self {
            entry_type,
            key: key.into(),
            fields: FieldMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name, value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn file(&self) -> Option<PathBuf> {
        self.field(FILE_FIELD).map(PathBuf::from)
    }

    pub fn set_file(&mut self, path: &std::path::Path) {
        self.fields.insert(FILE_FIELD, path.display().to_string());
    }

    pub fn stored_fingerprint(&self) -> Option<&str> {
        self.field(FINGERPRINT_FIELD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_are_case_insensitive() {
        let mut fields = FieldMap::new();
        fields.insert("Title", "A Study");
        fields.insert("TITLE", "A Better Study");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("title"), Some("A Better Study"));
    }

    #[test]
    fn deserialize_keeps_document_order_and_numbers() {
        let raw = r#"{"type":"Article","key":"Smith2020","fields":{"year":2020,"Author":"Smith, J."}}"#;
        let record: BibRecord = serde_json::from_str(raw).expect("parse");
        assert_eq!(record.entry_type, EntryType::Article);
        let names: Vec<_> = record.fields.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["year", "author"]);
        assert_eq!(record.field("year"), Some("2020"));
    }

    #[test]
    fn unknown_entry_type_is_rejected() {
        let raw = r#"{"type":"scroll","key":"x","fields":{}}"#;
        let err = serde_json::from_str::<BibRecord>(raw).expect_err("should fail");
        assert!(err.to_string().contains("unknown entry type"));
    }

    #[test]
    fn blank_fields_read_as_missing() {
        let record = BibRecord::new(EntryType::Misc, "k").with_field("doi", "  ");
        assert_eq!(record.field("doi"), None);
    }
}
