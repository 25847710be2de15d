//! Case-insensitive provider registry.

use silas_core::GateProvider;
use std::collections::HashMap;

/// Maps `check_type` (case-insensitive) to its evaluating provider.
#[derive(Default)]
pub struct GateRegistry {
    providers: HashMap<String, Box<dyn GateProvider>>,
}

impl GateRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        GateRegistry::default()
    }

    /// Register `provider` under `name`, lower-cased.
    pub fn register(&mut self, name: impl Into<String>, provider: Box<dyn GateProvider>) {
        self.providers.insert(name.into().to_lowercase(), provider);
    }

    /// Look up the provider for `check_type`, case-insensitively.
    #[must_use]
    pub fn get(&self, check_type: &str) -> Option<&dyn GateProvider> {
        self.providers.get(&check_type.to_lowercase()).map(std::convert::AsRef::as_ref)
    }
}
