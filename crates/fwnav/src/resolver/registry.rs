use std::sync::Arc;

use fwnav_graph::{ModuleDescriptor, ModuleId};
use indexmap::IndexMap;
use rustc_hash::FxHashMap as HashMap;

/// Interns effective module records for one build context.
///
/// Records parsed from the same descriptor file share an id when their
/// effective attributes agree; every distinct variant after the first gets
/// the next `#n` suffix.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: IndexMap<ModuleId, Arc<ModuleDescriptor>>,
    variants: HashMap<String, Vec<ModuleId>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module` and return the id it is known by.
    ///
    /// The second element is `true` when the record was not seen before.
    pub fn intern(&mut self, module: ModuleDescriptor) -> (ModuleId, bool) {
        let base = module.id.with_variant(1);
        if let Some(known) = self.variants.get(base.path_str()) {
            for id in known {
                if self
                    .modules
                    .get(id)
                    .is_some_and(|existing| existing.same_attributes(&module))
                {
                    return (id.clone(), false);
                }
            }
        }

        (self.push_variant(module), true)
    }

    /// Register `module` under the next free variant of its descriptor,
    /// even when an attribute-equal record is already known.
    pub fn push_variant(&mut self, module: ModuleDescriptor) -> ModuleId {
        let base = module.id.with_variant(1);
        let known = self.variants.entry(base.path_str().to_string()).or_default();
        let variant = u32::try_from(known.len() + 1).unwrap_or(u32::MAX);
        let id = base.with_variant(variant);
        known.push(id.clone());
        let module = if module.id == id { module } else { module.with_id(id.clone()) };
        self.modules.insert(id.clone(), Arc::new(module));
        id
    }

    pub fn get(&self, id: &ModuleId) -> Option<&Arc<ModuleDescriptor>> {
        self.modules.get(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn into_modules(self) -> IndexMap<ModuleId, Arc<ModuleDescriptor>> {
        self.modules
    }
}

#[cfg(test)]
mod tests {
    use fwnav_graph::ModuleType;

    use super::*;

    fn module(guid: &str) -> ModuleDescriptor {
        ModuleDescriptor::builder(
            ModuleId::new("Pkg/M1/M1.inf").unwrap(),
            "/ws/Pkg/M1/M1.inf",
            "M1",
            ModuleType::DxeDriver,
        )
        .guid(guid)
        .build()
    }

    #[test]
    fn identical_records_share_an_id() {
        let mut registry = ModuleRegistry::new();
        let (a, fresh_a) = registry.intern(module("1"));
        let (b, fresh_b) = registry.intern(module("1"));

        assert_eq!(a, b);
        assert!(fresh_a);
        assert!(!fresh_b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn pushed_variants_never_merge() {
        let mut registry = ModuleRegistry::new();
        let first = registry.push_variant(module("1"));
        let second = registry.push_variant(module("1"));

        assert_eq!(first.as_str(), "Pkg/M1/M1.inf");
        assert_eq!(second.as_str(), "Pkg/M1/M1.inf#2");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn differing_records_become_variants() {
        let mut registry = ModuleRegistry::new();
        let (first, _) = registry.intern(module("1"));
        let (second, _) = registry.intern(module("2"));
        let (again, _) = registry.intern(module("2"));

        assert_eq!(first.as_str(), "Pkg/M1/M1.inf");
        assert_eq!(second.as_str(), "Pkg/M1/M1.inf#2");
        assert_eq!(again, second);
        assert_eq!(registry.get(&second).unwrap().id, second);
        assert_eq!(registry.get(&second).unwrap().guid.as_deref(), Some("2"));
    }
}
