use std::fmt::{self, Display, Formatter};

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Number;

/// A single value inside a field tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    /// Integer or float, kept in its original representation.
    Number(Number),
    String(String),
    List(Vec<FieldValue>),
    Map(Fields),
}

/// An ordered key/value mapping that preserves insertion order and every key
/// it was built from, including keys no caller interprets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fields {
    entries: Vec<(String, FieldValue)>,
}

impl Fields {
    /// Create an empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in their stored order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Return the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut FieldValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Insert a value. An existing key keeps its position and has its value
    /// replaced; the previous value is returned.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.get_mut(&key) {
            return Some(std::mem::replace(slot, value));
        }
        self.entries.push((key, value));
        None
    }

    /// Remove a key, keeping the relative order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Walk nested maps along `path` and return the terminal value.
    pub fn get_path(&self, path: &[&str]) -> Option<&FieldValue> {
        let (first, rest) = path.split_first()?;
        let mut current = self.get(first)?;
        for segment in rest {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    /// Walk nested maps along `path` and return terminal string text.
    pub fn get_text(&self, path: &[&str]) -> Option<&str> {
        self.get_path(path).and_then(FieldValue::as_str)
    }

    /// Collect every string leaf reachable through `path`.
    ///
    /// Maps are descended by key. Lists are traversed element-wise at any
    /// point of the walk, so `members` matches both `"members": "a"` and
    /// `"members": ["a", "b"]`, and `gateway.name` matches
    /// `"gateway": [{"name": "gw1"}, {"name": "gw2"}]`.
    pub fn strings_at(&self, path: &[&str]) -> Vec<&str> {
        let mut out = Vec::new();
        if let Some((first, rest)) = path.split_first() {
            if let Some(value) = self.get(first) {
                collect_strings(value, rest, &mut out);
            }
        }
        out
    }

    /// Rewrite every string leaf reachable through `path` for which `rewrite`
    /// returns a replacement. Returns the number of leaves changed.
    pub fn rewrite_strings_at(
        &mut self,
        path: &[&str],
        rewrite: &mut dyn FnMut(&str) -> Option<String>,
    ) -> usize {
        let Some((first, rest)) = path.split_first() else {
            return 0;
        };
        match self.get_mut(first) {
            Some(value) => rewrite_strings(value, rest, rewrite),
            None => 0,
        }
    }
}

fn collect_strings<'a>(value: &'a FieldValue, path: &[&str], out: &mut Vec<&'a str>) {
    match value {
        FieldValue::List(items) => {
            for item in items {
                collect_strings(item, path, out);
            }
        }
        FieldValue::String(text) if path.is_empty() => out.push(text),
        FieldValue::Map(map) => {
            if let Some((first, rest)) = path.split_first() {
                if let Some(child) = map.get(first) {
                    collect_strings(child, rest, out);
                }
            }
        }
        _ => {}
    }
}

fn rewrite_strings(
    value: &mut FieldValue,
    path: &[&str],
    rewrite: &mut dyn FnMut(&str) -> Option<String>,
) -> usize {
    match value {
        FieldValue::List(items) => items
            .iter_mut()
            .map(|item| rewrite_strings(item, path, rewrite))
            .sum(),
        FieldValue::String(text) if path.is_empty() => match rewrite(text) {
            Some(replacement) => {
                *text = replacement;
                1
            }
            None => 0,
        },
        FieldValue::Map(map) => map.rewrite_strings_at(path, rewrite),
        _ => 0,
    }
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Fields> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the value's variant, used in structural diff messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<Fields> for FieldValue {
    fn from(value: Fields) -> Self {
        Self::Map(value)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (key, value) in iter {
            fields.insert(key, value);
        }
        fields
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(flag) => serializer.serialize_bool(*flag),
            Self::Number(number) => number.serialize(serializer),
            Self::String(text) => serializer.serialize_str(text),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(map) => map.serialize(serializer),
        }
    }
}

struct FieldsVisitor;

impl<'de> Visitor<'de> for FieldsVisitor {
    type Value = Fields;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("an object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Fields, A::Error> {
        let mut fields = Fields::new();
        while let Some((key, value)) = access.next_entry::<String, FieldValue>()? {
            fields.insert(key, value);
        }
        Ok(fields)
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldsVisitor)
    }
}

struct FieldValueVisitor;

impl<'de> Visitor<'de> for FieldValueVisitor {
    type Value = FieldValue;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<FieldValue, E> {
        Ok(FieldValue::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<FieldValue, E> {
        Ok(FieldValue::Number(value.into()))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<FieldValue, E> {
        Ok(FieldValue::Number(value.into()))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<FieldValue, E> {
        Number::from_f64(value)
            .map(FieldValue::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<FieldValue, E> {
        Ok(FieldValue::String(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<FieldValue, E> {
        Ok(FieldValue::String(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<FieldValue, D::Error> {
        FieldValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<FieldValue, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = access.next_element::<FieldValue>()? {
            items.push(item);
        }
        Ok(FieldValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, access: A) -> Result<FieldValue, A::Error> {
        FieldsVisitor.visit_map(access).map(FieldValue::Map)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldValueVisitor)
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(text) => write!(f, "{text}"),
            other => {
                let rendered = serde_json::to_string(other).map_err(|_| fmt::Error)?;
                f.write_str(&rendered)
            }
        }
    }
}

impl Display for Fields {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, Fields};

    fn sample() -> Fields {
        serde_json::from_str(
            r#"{"zeta": 1, "alpha": {"inner": "value"}, "members": ["a", "b"],
                "gateway": [{"name": "gw1"}, {"name": "gw2", "extra": true}]}"#,
        )
        .expect("sample fields")
    }

    #[test]
    fn preserves_key_order() {
        let fields = sample();
        let keys: Vec<&str> = fields.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "members", "gateway"]);
    }

    #[test]
    fn get_text_walks_nested_path() {
        assert_eq!(sample().get_text(&["alpha", "inner"]), Some("value"));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut fields = sample();
        let previous = fields.insert("alpha", "flat");
        assert!(matches!(previous, Some(FieldValue::Map(_))));
        assert_eq!(fields.keys().nth(1), Some("alpha"));
        assert_eq!(fields.get_text(&["alpha"]), Some("flat"));
    }

    #[test]
    fn strings_at_traverses_lists_of_maps() {
        let fields = sample();
        assert_eq!(fields.strings_at(&["members"]), vec!["a", "b"]);
        assert_eq!(fields.strings_at(&["gateway", "name"]), vec!["gw1", "gw2"]);
        assert!(fields.strings_at(&["missing"]).is_empty());
    }

    #[test]
    fn rewrite_strings_at_changes_matching_leaves_only() {
        let mut fields = sample();
        let changed = fields.rewrite_strings_at(&["members"], &mut |value| {
            (value == "b").then(|| "b-1".to_string())
        });
        assert_eq!(changed, 1);
        assert_eq!(fields.strings_at(&["members"]), vec!["a", "b-1"]);
    }
}
