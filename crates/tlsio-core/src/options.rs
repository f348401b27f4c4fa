//! Transport options.
//!
//! The TLS transport accepts no options of its own. `set_option` and
//! `retrieve_options` exist so it can stand in for sibling transports that
//! do; see [`crate::transport::Transport`].

/// A single option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Boolean flag
    Bool(bool),
    /// Integer setting
    Int(i64),
    /// String setting
    Str(String),
    /// Opaque bytes (certificates, keys)
    Bytes(Vec<u8>),
}

/// Snapshot of a transport's options, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOptions {
    entries: Vec<(String, OptionValue)>,
}

impl TransportOptions {
    /// Create an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: OptionValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Look up `name`.
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Iterate options in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no options are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_existing() {
        let mut options = TransportOptions::new();
        options.insert("timeout", OptionValue::Int(5));
        options.insert("trusted_certs", OptionValue::Bytes(vec![1, 2]));
        options.insert("timeout", OptionValue::Int(9));

        assert_eq!(options.len(), 2);
        assert_eq!(options.get("timeout"), Some(&OptionValue::Int(9)));
        let names: Vec<_> = options.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["timeout", "trusted_certs"]);
    }
}
