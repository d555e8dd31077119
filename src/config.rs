//! Caller-supplied configuration.
//!
//! This is *library-level configuration*. The binary (or a host) maps its own
//! input into `Config` so the adapter stays reusable outside of any one frontend.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Result;

/// Options that control how a media session is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Demuxer options forwarded verbatim to the codec library, in order.
    ///
    /// Typical keys: probe size, analyze duration, protocol whitelist, container
    /// hints. Unknown keys are passed through; the codec library decides whether
    /// they are valid.
    #[serde(rename = "FFmpegOptions", default)]
    pub ffmpeg_options: Dictionary,
}

impl Config {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// An ordered string→string mapping, the codec library's options object.
///
/// Insertion order is preserved. Setting an existing key replaces its value in
/// place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    entries: Vec<(String, String)>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Remove and return an entry. Codec libraries use this to consume the
    /// options they recognize.
    pub fn take(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Dictionary
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for (k, v) in iter {
            dict.set(k, v);
        }
        dict
    }
}

impl Serialize for Dictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Dictionary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(DictionaryVisitor)
    }
}

struct DictionaryVisitor;

impl<'de> Visitor<'de> for DictionaryVisitor {
    type Value = Dictionary;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of string options")
    }

    // Visiting entries one by one keeps document order, which a `HashMap` would lose.
    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut dict = Dictionary::new();
        while let Some((key, value)) = access.next_entry::<String, String>()? {
            dict.set(key, value);
        }
        Ok(dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_options_keep_document_order() -> anyhow::Result<()> {
        let config = Config::from_json(
            r#"{"FFmpegOptions": {"probesize": "32", "analyzeduration": "0", "format": "mp3"}}"#,
        )?;
        let keys: Vec<&str> = config.ffmpeg_options.keys().collect();
        assert_eq!(keys, ["probesize", "analyzeduration", "format"]);
        assert_eq!(config.ffmpeg_options.get("format"), Some("mp3"));
        Ok(())
    }

    #[test]
    fn missing_options_default_to_empty() -> anyhow::Result<()> {
        let config = Config::from_json("{}")?;
        assert!(config.ffmpeg_options.is_empty());
        Ok(())
    }

    #[test]
    fn set_replaces_in_place_and_take_consumes() {
        let mut dict: Dictionary = [("a", "1"), ("b", "2")].into_iter().collect();
        dict.set("a", "3");
        assert_eq!(dict.iter().collect::<Vec<_>>(), [("a", "3"), ("b", "2")]);

        assert_eq!(dict.take("a").as_deref(), Some("3"));
        assert_eq!(dict.take("a"), None);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn serializes_back_as_a_map() -> anyhow::Result<()> {
        let config = Config {
            ffmpeg_options: [("z", "1"), ("a", "2")].into_iter().collect(),
        };
        let json = serde_json::to_string(&config)?;
        assert_eq!(json, r#"{"FFmpegOptions":{"z":"1","a":"2"}}"#);
        Ok(())
    }

    #[test]
    fn non_string_values_are_rejected() {
        assert!(Config::from_json(r#"{"FFmpegOptions": {"probesize": 32}}"#).is_err());
    }
}
