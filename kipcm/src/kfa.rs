// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The kernel flow allocator collaborator.
//!
//! Out of scope for this crate: per-flow buffer queues and blocking
//! `read`/`write` I/O. [`KernelFlowAllocator`] is the boundary the
//! facade and handlers call across.

use crate::error::KipcmResult;
use crate::id::{FlowId, IpcpId, PortId};
use std::fmt::Debug;

/// An opaque SDU (service data unit) payload handed to/from the flow
/// allocator. Ownership transfers on every call: the callee always
/// consumes `sdu_write`'s argument, and the caller always owns
/// `sdu_read`'s return value.
pub type Sdu = Vec<u8>;

/// The external kernel flow allocator.
pub trait KernelFlowAllocator: Debug + Send + Sync {
    /// Mint a fresh flow id for a new allocation attempt.
    fn flow_create(&self) -> KipcmResult<FlowId>;

    /// Whether a flow with this id is currently tracked (used by
    /// `flow_arrived` to confirm the IPCP actually has this flow pending).
    fn find_flow(&self, flow_id: FlowId) -> bool;

    /// Bind a previously-minted flow id to a port, committing the flow.
    fn flow_bind(&self, flow_id: FlowId, port_id: PortId, ipc_id: IpcpId) -> KipcmResult<()>;

    /// Tear down the flow bound to `port_id`.
    fn flow_unbind(&self, port_id: PortId) -> KipcmResult<()>;

    /// Remove every flow (pending or bound) associated with `ipc_id`,
    /// called when the owning IPCP is destroyed.
    fn remove_all_for_ipcp(&self, ipc_id: IpcpId) -> KipcmResult<()>;

    /// Write an SDU to the flow bound to `port_id`. `sdu` is always
    /// consumed, on both success and error.
    fn sdu_write(&self, port_id: PortId, sdu: Sdu) -> KipcmResult<()>;

    /// Read the next SDU from the flow bound to `port_id`.
    fn sdu_read(&self, port_id: PortId) -> KipcmResult<Sdu>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::KipcmError;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// An in-memory [`KernelFlowAllocator`] double for tests.
    #[derive(Debug, Default)]
    pub struct FakeKfa {
        next_flow: AtomicU32,
        pending: Mutex<HashSet<FlowId>>,
        bound: Mutex<HashMap<PortId, (FlowId, IpcpId)>>,
    }

    impl FakeKfa {
        pub fn new() -> Self {
            Self {
                next_flow: AtomicU32::new(1),
                pending: Mutex::new(HashSet::new()),
                bound: Mutex::new(HashMap::new()),
            }
        }
    }

    impl KernelFlowAllocator for FakeKfa {
        fn flow_create(&self) -> KipcmResult<FlowId> {
            let raw = self.next_flow.fetch_add(1, Ordering::SeqCst);
            let id = FlowId::new_checked(raw).expect("counter starts at 1 and only increases");
            self.pending.lock().unwrap().insert(id);
            Ok(id)
        }

        fn find_flow(&self, flow_id: FlowId) -> bool {
            self.pending.lock().unwrap().contains(&flow_id)
        }

        fn flow_bind(&self, flow_id: FlowId, port_id: PortId, ipc_id: IpcpId) -> KipcmResult<()> {
            self.bound.lock().unwrap().insert(port_id, (flow_id, ipc_id));
            Ok(())
        }

        fn flow_unbind(&self, port_id: PortId) -> KipcmResult<()> {
            self.bound
                .lock()
                .unwrap()
                .remove(&port_id)
                .map(|_| ())
                .ok_or_else(|| KipcmError::port_not_found(port_id))
        }

        fn remove_all_for_ipcp(&self, ipc_id: IpcpId) -> KipcmResult<()> {
            self.bound.lock().unwrap().retain(|_, (_, owner)| *owner != ipc_id);
            Ok(())
        }

        fn sdu_write(&self, port_id: PortId, _sdu: Sdu) -> KipcmResult<()> {
            if self.bound.lock().unwrap().contains_key(&port_id) {
                Ok(())
            } else {
                Err(KipcmError::port_not_found(port_id))
            }
        }

        fn sdu_read(&self, port_id: PortId) -> KipcmResult<Sdu> {
            if self.bound.lock().unwrap().contains_key(&port_id) {
                Ok(Vec::new())
            } else {
                Err(KipcmError::port_not_found(port_id))
            }
        }
    }
}
