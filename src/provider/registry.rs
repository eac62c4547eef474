//! Provider name lookup

use std::collections::HashMap;

use super::{builtin, ProviderSpec};

/// Map from lowercase provider name to its registry entry. Immutable once built.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, ProviderSpec>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Registry holding every built-in provider
    pub fn with_builtins() -> Self {
        Self::builder().builtins().build()
    }

    pub fn get(&self, name: &str) -> Option<&ProviderSpec> {
        self.providers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Entries sorted by name
    pub fn specs(&self) -> Vec<&ProviderSpec> {
        let mut specs: Vec<_> = self.providers.values().collect();
        specs.sort_by_key(|s| s.name);
        specs
    }
}

#[derive(Debug, Default)]
pub struct ProviderRegistryBuilder {
    providers: HashMap<&'static str, ProviderSpec>,
}

impl ProviderRegistryBuilder {
    /// Add a provider. A later entry with the same name replaces the earlier one.
    pub fn provider(mut self, spec: ProviderSpec) -> Self {
        if let Some(old) = self.providers.insert(spec.name, spec) {
            tracing::debug!(name = old.name, "provider replaced");
        }
        self
    }

    pub fn providers(self, specs: impl IntoIterator<Item = ProviderSpec>) -> Self {
        specs.into_iter().fold(self, Self::provider)
    }

    pub fn builtins(self) -> Self {
        self.providers(builtin::all())
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Construct, NodeKind};

    #[test]
    fn test_builtins_registered() {
        let registry = ProviderRegistry::with_builtins();
        for name in ["if_empty", "else", "endif", "exec", "execi", "execbar", "read_tcp"] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert_eq!(registry.get("exec").map(|s| s.kind), Some(NodeKind::Print));
    }

    #[test]
    fn test_later_entry_replaces() {
        let registry = ProviderRegistry::builder()
            .provider(ProviderSpec::new("hello", NodeKind::Print, |_, _| {
                Ok(Construct::text("a"))
            }))
            .provider(ProviderSpec::new("hello", NodeKind::PlainText, |_, _| {
                Ok(Construct::text("b"))
            }))
            .build();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("hello").map(|s| s.kind), Some(NodeKind::PlainText));
    }

    #[test]
    fn test_specs_sorted() {
        let registry = ProviderRegistry::with_builtins();
        let names: Vec<_> = registry.specs().iter().map(|s| s.name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
