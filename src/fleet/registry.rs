//! Fleet registry: address to configured engine handle

use std::collections::HashMap;

use super::engine::EngineHandle;

/// Engines whose most recent configuration attempt succeeded, keyed by address
#[derive(Default)]
pub struct FleetRegistry {
    engines: HashMap<String, Box<dyn EngineHandle>>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle, returning the handle it replaces
    pub fn insert(
        &mut self,
        address: impl Into<String>,
        handle: Box<dyn EngineHandle>,
    ) -> Option<Box<dyn EngineHandle>> {
        self.engines.insert(address.into(), handle)
    }

    pub fn remove(&mut self, address: &str) -> Option<Box<dyn EngineHandle>> {
        self.engines.remove(address)
    }

    pub fn get(&self, address: &str) -> Option<&dyn EngineHandle> {
        self.engines.get(address).map(|h| &**h)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.engines.contains_key(address)
    }

    /// Sorted snapshot of registered addresses
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.engines.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl std::fmt::Debug for FleetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetRegistry")
            .field("addresses", &self.addresses())
            .finish()
    }
}
