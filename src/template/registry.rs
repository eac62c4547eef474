//! Storage for the user's `template0`..`template9` macro bodies

use std::collections::BTreeMap;
use thiserror::Error;

/// Number of macro slots, `template0` through `template9`
pub const MAX_TEMPLATES: usize = 10;

/// Errors that can occur while expanding templates
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// `\0` in a template body
    #[error("invalid template argument \\0 in template{index}; arguments start at \\1")]
    ZeroArgument { index: usize },

    /// `${template...` without a closing brace
    #[error("cannot find a closing '}}' in template expansion at byte {offset}")]
    Unterminated { offset: usize },

    /// Expansion kept producing references
    #[error("template expansion did not settle after {passes} passes")]
    ExpansionLimit { passes: usize },

    /// A configuration key that is not `template0`..`template9`
    #[error("unknown template slot '{name}'; expected template0 to template9")]
    InvalidSlot { name: String },
}

/// Registry of macro bodies indexed by slot number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateRegistry {
    slots: [Option<String>; MAX_TEMPLATES],
}

impl TemplateRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a `[templates]` configuration table
    pub fn from_table(table: &BTreeMap<String, String>) -> Result<Self, TemplateError> {
        let mut registry = Self::new();
        for (name, body) in table {
            let index = slot_index(name).ok_or_else(|| TemplateError::InvalidSlot {
                name: name.clone(),
            })?;
            registry.set(index, body.clone());
        }
        Ok(registry)
    }

    /// Set the body of slot `index`. Out-of-range slots are ignored.
    pub fn set(&mut self, index: usize, body: impl Into<String>) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(body.into());
        }
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, index: usize, body: impl Into<String>) -> Self {
        self.set(index, body);
        self
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.slots.get(index).and_then(|s| s.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Defined slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_deref().map(|s| (i, s)))
    }
}

/// Parse `templateN` into `N`
pub fn slot_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix("template")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|&i| i < MAX_TEMPLATES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index() {
        assert_eq!(slot_index("template0"), Some(0));
        assert_eq!(slot_index("template9"), Some(9));
        assert_eq!(slot_index("template10"), None);
        assert_eq!(slot_index("template"), None);
        assert_eq!(slot_index("templatex"), None);
        assert_eq!(slot_index("other1"), None);
    }

    #[test]
    fn test_from_table() {
        let mut table = BTreeMap::new();
        table.insert("template1".to_string(), "\\1!".to_string());
        let registry = TemplateRegistry::from_table(&table).unwrap();
        assert_eq!(registry.get(1), Some("\\1!"));
        assert_eq!(registry.get(2), None);
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn test_from_table_rejects_unknown_slot() {
        let mut table = BTreeMap::new();
        table.insert("template12".to_string(), "x".to_string());
        let err = TemplateRegistry::from_table(&table).unwrap_err();
        assert_eq!(
            err,
            TemplateError::InvalidSlot {
                name: "template12".to_string()
            }
        );
    }
}
