use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::SourceKind;
use crate::error::RiggerError;
use crate::ports::SourceAdapter;

/// Registry of adapters (source kind -> adapter).
///
/// Built during initialization, read-only once the run starts, so lookups
/// need no lock.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own `kind()`.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> Result<(), RiggerError> {
        let kind = adapter.kind();
        if self.adapters.contains_key(&kind) {
            return Err(RiggerError::DuplicateAdapter(kind));
        }
        self.adapters.insert(kind, adapter);
        Ok(())
    }

    pub fn get(&self, kind: SourceKind) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.get(&kind)
    }

    pub fn contains(&self, kind: SourceKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    /// Per-kind parallelism limits declared by the adapters.
    pub fn limits(&self) -> Vec<(SourceKind, usize)> {
        self.adapters
            .iter()
            .filter_map(|(kind, adapter)| adapter.max_parallel().map(|limit| (*kind, limit)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
