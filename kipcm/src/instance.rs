// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPCP instance map: `IpcpId -> IpcpInstance`.

use crate::error::{KipcmError, KipcmResult};
use crate::id::{FlowId, IpcpId, PortId};
use std::collections::HashMap;
use std::fmt::Debug;
use tracing::debug;

/// The six operations a concrete IPCP implementation exposes to the KIPCM.
///
/// Out of scope here: what these operations actually do inside a given DIF
/// (policies, routing, PDU forwarding). This crate only needs the
/// boundary the control plane calls across.
pub trait IpcpOps: Debug + Send + Sync {
    /// Assign this IPCP to a DIF, with the given (already parsed)
    /// configuration payload.
    fn assign_to_dif(&self, dif_name: &str, dif_config: &str) -> KipcmResult<()>;

    /// Register an application name with this IPCP.
    fn application_register(&self, app_name: &str) -> KipcmResult<()>;

    /// Unregister an application name from this IPCP.
    fn application_unregister(&self, app_name: &str) -> KipcmResult<()>;

    /// Begin allocating a flow from `source` to `dest`, for the freshly
    /// minted `flow_id`/`port_id`. The eventual result arrives
    /// asynchronously via [`crate::facade::Kipcm::flow_res`].
    fn flow_allocate_request(
        &self,
        source: &str,
        dest: &str,
        flow_spec: &str,
        port_id: PortId,
        flow_id: FlowId,
    ) -> KipcmResult<()>;

    /// Deliver the peer's response to a previously-notified inbound flow
    /// allocation.
    fn flow_allocate_response(
        &self,
        flow_id: FlowId,
        port_id: PortId,
        result: i32,
    ) -> KipcmResult<()>;

    /// Tear down a bound flow.
    fn flow_deallocate(&self, port_id: PortId) -> KipcmResult<()>;
}

/// An IPCP instance: owned by its factory, referenced by exactly one entry
/// in the [`InstanceMap`].
#[derive(Debug)]
pub struct IpcpInstance {
    id: IpcpId,
    factory_name: String,
    ops: Box<dyn IpcpOps>,
}

impl IpcpInstance {
    pub(crate) fn new(id: IpcpId, factory_name: String, ops: Box<dyn IpcpOps>) -> Self {
        Self {
            id,
            factory_name,
            ops,
        }
    }

    /// This instance's identifier.
    #[must_use]
    pub fn id(&self) -> IpcpId {
        self.id
    }

    /// The name of the factory that created this instance.
    #[must_use]
    pub fn factory_name(&self) -> &str {
        &self.factory_name
    }

    /// Access the instance's operations.
    #[must_use]
    pub fn ops(&self) -> &dyn IpcpOps {
        self.ops.as_ref()
    }

    pub(crate) fn into_ops(self) -> Box<dyn IpcpOps> {
        self.ops
    }
}

/// `IpcpId -> IpcpInstance` map.
///
/// IDs are externally assigned by the caller; a collision is a caller
/// error (`AlreadyExists`), never silently overwritten.
#[derive(Debug, Default)]
pub struct InstanceMap {
    instances: HashMap<IpcpId, IpcpInstance>,
}

impl InstanceMap {
    /// Create an empty instance map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new instance under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`KipcmError::AlreadyExists`] if `id` is already present.
    pub fn insert(&mut self, instance: IpcpInstance) -> KipcmResult<()> {
        let id = instance.id;
        if self.instances.contains_key(&id) {
            return Err(KipcmError::AlreadyExists(format!(
                "IPC process {id} already exists"
            )));
        }
        self.instances.insert(id, instance);
        debug!(%id, "IPC process instance inserted");
        Ok(())
    }

    /// Look up an instance by id.
    #[must_use]
    pub fn find(&self, id: IpcpId) -> Option<&IpcpInstance> {
        self.instances.get(&id)
    }

    /// Remove and return an instance by id.
    ///
    /// # Errors
    ///
    /// Returns [`KipcmError::NotFound`] if `id` is not present.
    pub fn remove(&mut self, id: IpcpId) -> KipcmResult<IpcpInstance> {
        self.instances
            .remove(&id)
            .inspect(|_| debug!(%id, "IPC process instance removed"))
            .ok_or_else(|| KipcmError::ipcp_not_found(id))
    }

    /// Whether the map holds no instances.
    #[must_use]
    pub fn empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Number of instances currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;

    #[derive(Debug)]
    struct StubOps;
    impl IpcpOps for StubOps {
        fn assign_to_dif(&self, _dif_name: &str, _dif_config: &str) -> KipcmResult<()> {
            Ok(())
        }
        fn application_register(&self, _app_name: &str) -> KipcmResult<()> {
            Ok(())
        }
        fn application_unregister(&self, _app_name: &str) -> KipcmResult<()> {
            Ok(())
        }
        fn flow_allocate_request(
            &self,
            _source: &str,
            _dest: &str,
            _flow_spec: &str,
            _port_id: PortId,
            _flow_id: FlowId,
        ) -> KipcmResult<()> {
            Ok(())
        }
        fn flow_allocate_response(
            &self,
            _flow_id: FlowId,
            _port_id: PortId,
            _result: i32,
        ) -> KipcmResult<()> {
            Ok(())
        }
        fn flow_deallocate(&self, _port_id: PortId) -> KipcmResult<()> {
            Ok(())
        }
    }

    fn instance(id: u32) -> IpcpInstance {
        IpcpInstance::new(
            IpcpId::new_checked(id).unwrap(),
            "normal-ipc".to_string(),
            Box::new(StubOps),
        )
    }

    #[test]
    fn insert_find_remove_round_trip() {
        let mut map = InstanceMap::new();
        let id = IpcpId::new_checked(3).unwrap();
        map.insert(instance(3)).unwrap();
        assert!(map.find(id).is_some());
        assert!(!map.empty());
        map.remove(id).unwrap();
        assert!(map.find(id).is_none());
        assert!(map.empty());
    }

    #[test]
    fn insert_duplicate_id_fails() {
        let mut map = InstanceMap::new();
        map.insert(instance(5)).unwrap();
        let err = map.insert(instance(5)).unwrap_err();
        assert!(matches!(err, KipcmError::AlreadyExists(_)));
    }

    #[test]
    fn remove_missing_id_fails() {
        let mut map = InstanceMap::new();
        let err = map
            .remove(IpcpId::new_checked(9).unwrap())
            .unwrap_err();
        assert!(matches!(err, KipcmError::NotFound(_)));
    }
}
