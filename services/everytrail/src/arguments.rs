use bytes::Bytes;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Value of an API argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A text value.
    Text(String),
    /// Raw data, sent as is in multipart bodies.
    Data(Bytes),
}

impl Value {
    /// Bytes of this value as they enter the signature.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Value::Text(s) => s.as_bytes(),
            Value::Data(bs) => bs,
        }
    }

    /// Text form of this value, data is decoded lossily.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Value::Text(s) => Cow::Borrowed(s),
            Value::Data(bs) => String::from_utf8_lossy(bs),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Data(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Data(Bytes::from(v))
    }
}

/// Arguments of an API call.
///
/// Keys are unique and keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    pairs: Vec<(String, Value)>,
}

impl Arguments {
    /// Create empty arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert an argument.
    ///
    /// An existing key keeps its position and gets the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.pairs.push((key, value)),
        }
    }

    /// Get the value of an argument.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Check if there is no argument.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate over the arguments in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Arguments {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut args = Arguments::new();
        for (k, v) in iter {
            args.insert(k, v);
        }
        args
    }
}

impl From<HashMap<String, String>> for Arguments {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<BTreeMap<String, String>> for Arguments {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut args = Arguments::new().with("b", "1").with("a", "2");
        args.insert("b", "3");

        let pairs: Vec<_> = args.iter().map(|(k, v)| (k, v.to_text())).collect();
        assert_eq!(pairs, vec![("b", "3".into()), ("a", "2".into())]);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(42i64), Value::Text("42".to_string()));
        assert_eq!(Value::from(vec![0xffu8]).as_bytes(), &[0xff]);
        assert_eq!(Value::from(vec![0xffu8]).to_text(), "\u{fffd}");
        assert!(Arguments::new().is_empty());
    }
}
