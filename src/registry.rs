//! Module registry.
//!
//! Control-plane modules register by name, and exactly one component may
//! own the switch fabric's router interface. Both registrations are made
//! once while the node is assembled; a second claim is a wiring mistake.

use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

/// Errors from registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("module '{0}' already registered")]
    DuplicateModule(String),

    #[error("router interface already bound to '{0}'")]
    RouterInterfaceBound(String),
}

/// Registry of control-plane modules and the router interface owner.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeSet<String>,
    router_interface: Option<String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a control-plane module.
    pub fn register_module(&mut self, name: &str) -> Result<(), RegistryError> {
        if !self.modules.insert(name.to_string()) {
            return Err(RegistryError::DuplicateModule(name.to_string()));
        }
        debug!(module = name, "Control-plane module registered");
        Ok(())
    }

    /// Bind the switch fabric's router interface to `owner`.
    pub fn bind_router_interface(&mut self, owner: &str) -> Result<(), RegistryError> {
        if let Some(existing) = &self.router_interface {
            return Err(RegistryError::RouterInterfaceBound(existing.clone()));
        }
        self.router_interface = Some(owner.to_string());
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.modules.contains(name)
    }

    /// Current owner of the router interface.
    pub fn router_interface(&self) -> Option<&str> {
        self.router_interface.as_deref()
    }

    /// Undo a module registration.
    pub fn unregister_module(&mut self, name: &str) -> bool {
        self.modules.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_module() {
        let mut registry = ModuleRegistry::new();
        registry.register_module("dispatch").unwrap();
        assert!(registry.is_registered("dispatch"));
        assert_eq!(
            registry.register_module("dispatch"),
            Err(RegistryError::DuplicateModule("dispatch".into()))
        );

        assert!(registry.unregister_module("dispatch"));
        registry.register_module("dispatch").unwrap();
    }

    #[test]
    fn test_router_interface_single_owner() {
        let mut registry = ModuleRegistry::new();
        registry.bind_router_interface("dispatch").unwrap();
        assert_eq!(registry.router_interface(), Some("dispatch"));
        assert_eq!(
            registry.bind_router_interface("other"),
            Err(RegistryError::RouterInterfaceBound("dispatch".into()))
        );
    }
}
