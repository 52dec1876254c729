// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPCP factory table: the registry of pluggable IPCP implementation kinds.

use crate::error::{KipcmError, KipcmResult};
use crate::id::IpcpId;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Name of the factory used when the caller does not specify one.
pub const DEFAULT_FACTORY: &str = "normal-ipc";

/// Operations a concrete IPCP implementation kind must provide.
pub trait IpcpFactoryOps: Debug + Send + Sync {
    /// Construct a new IPCP instance of this kind, named `name` and
    /// assigned identifier `id`. Returns `None` on failure.
    fn create(&self, name: &str, id: IpcpId) -> Option<Box<dyn crate::instance::IpcpOps>>;

    /// Tear down an instance previously created by this factory.
    fn destroy(&self, instance: Box<dyn crate::instance::IpcpOps>) -> KipcmResult<()>;
}

/// A registered IPCP implementation kind.
#[derive(Debug)]
pub struct IpcpFactory {
    name: String,
    ops: Arc<dyn IpcpFactoryOps>,
}

impl IpcpFactory {
    /// The unique name this factory was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ops(&self) -> &Arc<dyn IpcpFactoryOps> {
        &self.ops
    }
}

/// Registry of factory kinds, indexed by name.
///
/// Insertion order is not observable; the table is a set keyed by name, as
/// specified. A live-instance reference count per factory backs the
/// `unregister`-while-in-use check (see `DESIGN.md`).
#[derive(Debug, Default)]
pub struct FactoryTable {
    factories: HashMap<String, Arc<IpcpFactory>>,
    live_instances: HashMap<String, usize>,
}

impl FactoryTable {
    /// Create an empty factory table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new factory kind under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`KipcmError::AlreadyExists`] if `name` is already
    /// registered.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        ops: Arc<dyn IpcpFactoryOps>,
    ) -> KipcmResult<Arc<IpcpFactory>> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(KipcmError::AlreadyExists(format!(
                "factory '{name}' is already registered"
            )));
        }
        let factory = Arc::new(IpcpFactory {
            name: name.clone(),
            ops,
        });
        self.factories.insert(name.clone(), factory.clone());
        self.live_instances.insert(name, 0);
        debug!(factory = %factory.name, "registered IPCP factory");
        Ok(factory)
    }

    /// Remove a previously registered factory.
    ///
    /// # Errors
    ///
    /// Returns [`KipcmError::NotFound`] if the factory is unknown, or
    /// [`KipcmError::InUse`] if any IPCP instance still references it.
    pub fn unregister(&mut self, name: &str) -> KipcmResult<()> {
        let live = *self
            .live_instances
            .get(name)
            .ok_or_else(|| KipcmError::factory_not_found(name))?;
        if live > 0 {
            return Err(KipcmError::InUse(name.to_string(), live));
        }
        self.factories.remove(name);
        self.live_instances.remove(name);
        debug!(factory = name, "unregistered IPCP factory");
        Ok(())
    }

    /// Look up a factory by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<IpcpFactory>> {
        self.factories.get(name).cloned()
    }

    /// Record that an instance was created against `name`'s factory.
    pub(crate) fn mark_instance_created(&mut self, name: &str) {
        if let Some(count) = self.live_instances.get_mut(name) {
            *count += 1;
        }
    }

    /// Record that an instance previously created against `name`'s
    /// factory has been destroyed.
    pub(crate) fn mark_instance_destroyed(&mut self, name: &str) {
        if let Some(count) = self.live_instances.get_mut(name) {
            *count = count.saturating_sub(1);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;

    #[derive(Debug)]
    struct NoopFactory;
    impl IpcpFactoryOps for NoopFactory {
        fn create(&self, _name: &str, _id: IpcpId) -> Option<Box<dyn crate::instance::IpcpOps>> {
            None
        }
        fn destroy(&self, _instance: Box<dyn crate::instance::IpcpOps>) -> KipcmResult<()> {
            Ok(())
        }
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let mut table = FactoryTable::new();
        table.register("normal-ipc", Arc::new(NoopFactory)).unwrap();
        let err = table.register("normal-ipc", Arc::new(NoopFactory)).unwrap_err();
        assert!(matches!(err, KipcmError::AlreadyExists(_)));
    }

    #[test]
    fn unregister_unknown_fails_not_found() {
        let mut table = FactoryTable::new();
        let err = table.unregister("ghost").unwrap_err();
        assert!(matches!(err, KipcmError::NotFound(_)));
    }

    #[test]
    fn unregister_in_use_fails() {
        let mut table = FactoryTable::new();
        table.register("normal-ipc", Arc::new(NoopFactory)).unwrap();
        table.mark_instance_created("normal-ipc");
        let err = table.unregister("normal-ipc").unwrap_err();
        assert!(matches!(err, KipcmError::InUse(_, 1)));
        table.mark_instance_destroyed("normal-ipc");
        table.unregister("normal-ipc").unwrap();
    }

    #[test]
    fn find_returns_registered_factory() {
        let mut table = FactoryTable::new();
        table.register("shim-dummy", Arc::new(NoopFactory)).unwrap();
        assert!(table.find("shim-dummy").is_some());
        assert!(table.find("missing").is_none());
    }
}
