// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The KIPCM facade: the single guarded aggregate tying the registry,
//! correlation tables, dispatcher, and the two external collaborators
//! (KFA, control transport) together behind one coarse mutex.

use crate::correlation::FlowMessages;
use crate::dispatch;
use crate::error::{KipcmError, KipcmResult};
use crate::factory::{DEFAULT_FACTORY, FactoryTable, IpcpFactory, IpcpFactoryOps};
use crate::id::{FlowId, IpcpId, PortId, SeqNum};
use crate::instance::{InstanceMap, IpcpInstance};
use crate::kfa::{KernelFlowAllocator, Sdu};
use crate::messages::{
    AllocateFlowRequestAttrs, AllocateFlowResponseAttrs, AssignToDifAttrs, ControlReply,
    ControlRequest, DeallocateFlowRequestAttrs, MessageHeader, RegUnregAppAttrs,
};
use crate::transport::ControlTransport;
use concurrency::sync::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

#[cfg(test)]
use concurrency::concurrency_mode;

/// Configuration threaded through [`Kipcm::create`].
#[derive(Debug, Clone)]
pub struct KipcmConfig {
    /// Factory name used when a caller of [`Kipcm::ipcp_create`] omits one.
    pub default_factory_name: String,
}

impl Default for KipcmConfig {
    fn default() -> Self {
        Self {
            default_factory_name: DEFAULT_FACTORY.to_string(),
        }
    }
}

/// State mutated under the facade's single mutex: the factory table, the
/// instance map, and both correlation tables.
#[derive(Debug)]
struct KipcmState {
    factories: FactoryTable,
    instances: InstanceMap,
    flows: FlowMessages,
}

impl KipcmState {
    fn new() -> Self {
        Self {
            factories: FactoryTable::new(),
            instances: InstanceMap::new(),
            flows: FlowMessages::new(),
        }
    }
}

/// The Kernel IPC Manager control-plane facade.
///
/// All mutating operations are serialized by `state`'s mutex; see
/// `DESIGN.md` for the concurrency envelope this mirrors.
#[derive(Debug)]
pub struct Kipcm {
    state: Mutex<KipcmState>,
    kfa: Arc<dyn KernelFlowAllocator>,
    transport: Arc<dyn ControlTransport>,
    config: KipcmConfig,
}

impl Kipcm {
    /// Construct a KIPCM instance: builds the factory table, instance map,
    /// and flow-message tables, then registers the six dispatch handlers.
    /// All four pieces exist before any handler can run; if registration
    /// fails `None` is returned and nothing is left half-built.
    #[must_use]
    #[instrument(skip(kfa, transport))]
    pub fn create(
        config: KipcmConfig,
        kfa: Arc<dyn KernelFlowAllocator>,
        transport: Arc<dyn ControlTransport>,
    ) -> Option<Arc<Kipcm>> {
        debug!("initializing KIPCM");
        let state = Mutex::new(KipcmState::new());
        let kipcm = Arc::new(Kipcm {
            state,
            kfa,
            transport,
            config,
        });

        if let Err(err) = dispatch::register_all(kipcm.transport.as_ref(), |kind| {
            let kipcm = Arc::clone(&kipcm);
            Box::new(move |req: ControlRequest| kipcm.dispatch(kind, req))
        }) {
            error!(%err, "failed to register control handlers, aborting KIPCM creation");
            return None;
        }

        info!("KIPCM initialized successfully");
        Some(kipcm)
    }

    /// Tear down a KIPCM instance.
    ///
    /// Asserts (in debug builds) that the instance map and both
    /// correlation tables are empty before releasing owned resources,
    /// then proceeds through every teardown step regardless of
    /// intermediate failure, aggregating the result.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if any IPC process instance or
    /// flow-allocation correlation entry was leaked.
    #[instrument(skip(self))]
    pub fn destroy(self: &Arc<Self>) -> KipcmResult<()> {
        debug!("finalizing KIPCM");
        let state = self.lock_state();
        debug_assert!(
            state.instances.empty(),
            "KIPCM destroyed with live IPC process instances"
        );
        debug_assert!(
            state.flows.empty(),
            "KIPCM destroyed with outstanding flow-allocation transactions"
        );
        drop(state);

        let result = dispatch::unregister_all(self.transport.as_ref());
        if let Err(err) = &result {
            error!(%err, "KIPCM teardown completed with errors");
        } else {
            info!("KIPCM finalized successfully");
        }
        result
    }

    fn lock_state(&self) -> concurrency::sync::MutexGuard<'_, KipcmState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    // ---- Factory (un)registration -------------------------------------

    /// Register a new IPCP factory kind.
    pub fn factory_register(
        &self,
        name: impl Into<String>,
        ops: Arc<dyn IpcpFactoryOps>,
    ) -> KipcmResult<Arc<IpcpFactory>> {
        self.lock_state().factories.register(name, ops)
    }

    /// Unregister an IPCP factory kind by name.
    pub fn factory_unregister(&self, name: &str) -> KipcmResult<()> {
        self.lock_state().factories.unregister(name)
    }

    // ---- IPCP CRUD ------------------------------------------------------

    /// Create a new IPCP instance named `name`, with identifier `id`, of
    /// the given factory kind (defaulting per `config` when omitted).
    #[instrument(skip(self, name))]
    pub fn ipcp_create(
        &self,
        name: &str,
        id: IpcpId,
        factory_name: Option<&str>,
    ) -> KipcmResult<()> {
        let factory_name = factory_name.unwrap_or(&self.config.default_factory_name);
        let mut state = self.lock_state();

        if state.instances.find(id).is_some() {
            return Err(KipcmError::AlreadyExists(format!(
                "IPC process {id} already exists"
            )));
        }

        let factory = state
            .factories
            .find(factory_name)
            .ok_or_else(|| KipcmError::factory_not_found(factory_name))?;

        let ops = factory
            .ops()
            .create(name, id)
            .ok_or_else(|| KipcmError::DelegateFail(format!("factory '{factory_name}' create")))?;

        let instance = IpcpInstance::new(id, factory_name.to_string(), ops);
        state.instances.insert(instance)?;
        state.factories.mark_instance_created(factory_name);
        debug!(%id, factory = factory_name, "IPC process created");
        Ok(())
    }

    /// Destroy an IPCP instance: removes every KFA flow for it, then
    /// calls factory-destroy, then removes it from the instance map. Each
    /// step is fatal on failure.
    #[instrument(skip(self))]
    pub fn ipcp_destroy(&self, id: IpcpId) -> KipcmResult<()> {
        let mut state = self.lock_state();
        let instance = state.instances.find(id).ok_or_else(|| KipcmError::ipcp_not_found(id))?;
        let factory_name = instance.factory_name().to_string();

        self.kfa.remove_all_for_ipcp(id)?;

        let instance = state.instances.remove(id)?;
        let factory = state
            .factories
            .find(&factory_name)
            .ok_or_else(|| KipcmError::factory_not_found(&factory_name))?;
        let destroy_result = factory.ops().destroy(instance.into_ops());
        state.factories.mark_instance_destroyed(&factory_name);
        destroy_result?;
        debug!(%id, "IPC process destroyed");
        Ok(())
    }

    // ---- Flow lifecycle --------------------------------------------------

    /// Notify the KIPCM that a peer-initiated flow has arrived. Mints the
    /// next sequence number from the transport, records `egress[seq] =
    /// flow_id`, and emits the arrival notification bound to the fixed
    /// notification channel (`nl_port_id = 1`).
    ///
    /// Exported for IPCP callers. Serialized under the KIPCM mutex like
    /// every other mutating operation; see `DESIGN.md` for why.
    #[instrument(skip(self, dif_name, source, dest, flow_spec))]
    pub fn flow_arrived(
        &self,
        ipc_id: IpcpId,
        flow_id: FlowId,
        dif_name: &str,
        source: &str,
        dest: &str,
        flow_spec: &str,
    ) -> KipcmResult<()> {
        if !self.kfa.find_flow(flow_id) {
            return Err(KipcmError::flow_not_found(flow_id));
        }
        let seq = self.transport.next_seq_num();
        {
            let mut state = self.lock_state();
            state.flows.egress.add(seq, flow_id)?;
        }
        self.transport.send(ControlReply::AllocateFlowRequestArrived {
            id: ipc_id.get(),
            dif_name: dif_name.to_string(),
            source: source.to_string(),
            dest: dest.to_string(),
            flow_spec: flow_spec.to_string(),
            seq,
            nl_port_id: 1,
        })
    }

    /// Bind a previously allocated flow to `port_id`. Must follow a prior
    /// `flow_arrived` or allocate-request.
    pub fn flow_add(&self, ipc_id: IpcpId, port_id: PortId, flow_id: FlowId) -> KipcmResult<()> {
        let state = self.lock_state();
        if state.instances.find(ipc_id).is_none() {
            return Err(KipcmError::ipcp_not_found(ipc_id));
        }
        drop(state);
        self.kfa.flow_bind(flow_id, port_id, ipc_id)
    }

    /// Tear down the flow bound to `port_id`.
    pub fn flow_remove(&self, port_id: PortId) -> KipcmResult<()> {
        self.kfa.flow_unbind(port_id)
    }

    /// Write an SDU to `port_id`, delegating to KFA. The mutex is held
    /// across the KFA call; see `DESIGN.md` for why this is accepted
    /// rather than narrowed. `sdu` is always consumed.
    pub fn sdu_write(&self, port_id: PortId, sdu: Sdu) -> KipcmResult<()> {
        let _state = self.lock_state();
        self.kfa.sdu_write(port_id, sdu)
    }

    /// Read the next SDU from `port_id`, delegating to KFA.
    pub fn sdu_read(&self, port_id: PortId) -> KipcmResult<Sdu> {
        self.kfa.sdu_read(port_id)
    }

    /// Deliver the result of an outbound (application-initiated) flow
    /// allocation: looks up `ingress[flow_id]` for the original request's
    /// sequence number, emits the allocate-flow-result reply on the fixed
    /// notification port (matching `flow_arrived`'s `nl_port_id = 1`), and
    /// removes the entry.
    #[instrument(skip(self))]
    pub fn flow_res(&self, ipc_id: IpcpId, flow_id: FlowId, result: i32) -> KipcmResult<()> {
        let seq = {
            let mut state = self.lock_state();
            state.flows.ingress.remove(flow_id)?
        };
        self.transport.send(ControlReply::AllocateFlowResult {
            id: ipc_id.get(),
            result,
            seq,
            port_id: 1,
        })
    }

    // ---- Control-message dispatch -----------------------------------

    fn dispatch(&self, kind: crate::messages::MessageKind, req: ControlRequest) -> KipcmResult<()> {
        use crate::messages::MessageKind as K;
        match (kind, req) {
            (K::AssignToDifRequest, ControlRequest::AssignToDif(hdr, attrs)) => {
                self.handle_assign_to_dif(hdr, attrs)
            }
            (K::AllocateFlowRequest, ControlRequest::AllocateFlowRequest(hdr, attrs)) => {
                self.handle_allocate_flow_request(hdr, attrs)
            }
            (K::AllocateFlowResponse, ControlRequest::AllocateFlowResponse(hdr, attrs)) => {
                self.handle_allocate_flow_response(hdr, attrs)
            }
            (K::DeallocateFlowRequest, ControlRequest::DeallocateFlowRequest(hdr, attrs)) => {
                self.handle_deallocate_flow_request(hdr, attrs)
            }
            (K::RegisterApplicationRequest, ControlRequest::RegisterApplication(hdr, attrs)) => {
                self.handle_reg_unreg_app(hdr, attrs, true)
            }
            (K::UnregisterApplicationRequest, ControlRequest::UnregisterApplication(hdr, attrs)) => {
                self.handle_reg_unreg_app(hdr, attrs, false)
            }
            (kind, _) => Err(KipcmError::InvalidArg(format!(
                "request kind did not match dispatched kind {kind:?}"
            ))),
        }
    }

    /// `ASSIGN_TO_DIF_REQUEST`: call `ipcp.assign_to_dif` with both the
    /// parsed DIF name and its configuration payload (see `DESIGN.md`,
    /// open question 2).
    fn handle_assign_to_dif(&self, hdr: MessageHeader, attrs: AssignToDifAttrs) -> KipcmResult<()> {
        let outcome = self.with_target_ipcp(hdr.dst_ipc_id, |instance| {
            instance
                .ops()
                .assign_to_dif(&attrs.dif_name, &attrs.dif_config)
        });
        let (id, result) = match outcome {
            Ok(()) => (hdr.dst_ipc_id.get(), 0),
            Err(HandlerError::TargetNotFound) => (0, -1),
            Err(HandlerError::Delegate(id)) => (id, -1),
        };
        self.transport.send(ControlReply::AssignToDifResponse {
            id,
            result,
            seq: hdr.src_seq,
        })
    }

    /// `ALLOCATE_FLOW_REQUEST`: look up the target IPCP first (mirroring
    /// the reference source's `notify_ipcp_allocate_flow_request`, which
    /// resolves the IPCP before ever touching the KFA), only then mint a
    /// `FlowId` and record `ingress[flow_id] = seq_num`, then call
    /// `ipcp.flow_allocate_request`. Minting a flow for an IPCP that turns
    /// out not to exist would leak it — there is no KFA operation to
    /// release an unbound flow — so the common "IPCP not found" path never
    /// reaches the KFA at all. On IPCP failure after the call, the ingress
    /// entry is rolled back before the error reply is sent, so a failed
    /// request never leaves a stale correlation entry behind (`DESIGN.md`,
    /// open question 1).
    fn handle_allocate_flow_request(
        &self,
        hdr: MessageHeader,
        attrs: AllocateFlowRequestAttrs,
    ) -> KipcmResult<()> {
        let reply_error = |id: u32| {
            self.transport.send(ControlReply::AllocateFlowResult {
                id,
                result: -1,
                seq: hdr.src_seq,
                port_id: attrs.port_id.get(),
            })
        };

        if self.lock_state().instances.find(hdr.dst_ipc_id).is_none() {
            return reply_error(0);
        }

        let flow_id = match self.kfa.flow_create() {
            Ok(flow_id) => flow_id,
            Err(err) => {
                error!(%err, "failed to mint flow id for allocate-flow-request");
                return reply_error(0);
            }
        };

        {
            let mut state = self.lock_state();
            if let Err(err) = state.flows.ingress.add(flow_id, hdr.src_seq) {
                error!(%err, "failed to record ingress correlation entry");
                return reply_error(0);
            }
        }

        let outcome = self.with_target_ipcp(hdr.dst_ipc_id, |instance| {
            instance.ops().flow_allocate_request(
                &attrs.source_name,
                &attrs.dest_name,
                &attrs.flow_spec,
                attrs.port_id,
                flow_id,
            )
        });

        match outcome {
            Ok(()) => Ok(()),
            Err(HandlerError::TargetNotFound) => {
                // The IPCP vanished between the lookup above and this call;
                // the flow was minted on its behalf, so roll that back too.
                self.lock_state().flows.ingress.remove(flow_id).ok();
                reply_error(0)
            }
            Err(HandlerError::Delegate(id)) => {
                self.lock_state().flows.ingress.remove(flow_id).ok();
                reply_error(id)
            }
        }
    }

    /// `ALLOCATE_FLOW_RESPONSE`: look up `egress[seq_num]`, call
    /// `ipcp.flow_allocate_response`, and remove the egress entry in
    /// either outcome. This message is not acknowledged on the transport
    /// (it consumes the egress entry; no reply is specified for it).
    fn handle_allocate_flow_response(
        &self,
        hdr: MessageHeader,
        attrs: AllocateFlowResponseAttrs,
    ) -> KipcmResult<()> {
        let flow_id = {
            let mut state = self.lock_state();
            match state.flows.egress.remove(hdr.src_seq) {
                Ok(flow_id) => flow_id,
                Err(err) => {
                    error!(%err, "allocate-flow-response for unknown sequence number");
                    return Ok(());
                }
            }
        };

        if let Err(outcome) = self.with_target_ipcp(hdr.dst_ipc_id, |instance| {
            instance
                .ops()
                .flow_allocate_response(flow_id, attrs.port_id, attrs.result)
        }) {
            error!(?outcome, "allocate-flow-response delegate failed");
        }
        Ok(())
    }

    /// `DEALLOCATE_FLOW_REQUEST`: call `ipcp.flow_deallocate`, reply with
    /// the aggregate result.
    fn handle_deallocate_flow_request(
        &self,
        hdr: MessageHeader,
        attrs: DeallocateFlowRequestAttrs,
    ) -> KipcmResult<()> {
        let outcome = self.with_target_ipcp(hdr.dst_ipc_id, |instance| {
            instance.ops().flow_deallocate(attrs.port_id)
        });
        let (id, result) = match outcome {
            Ok(()) => (hdr.dst_ipc_id.get(), 0),
            Err(HandlerError::TargetNotFound) => (0, -1),
            Err(HandlerError::Delegate(id)) => (id, -1),
        };
        self.transport.send(ControlReply::DeallocateFlowResponse {
            id,
            result,
            seq: hdr.src_seq,
        })
    }

    /// `REGISTER_APPLICATION_REQUEST` / `UNREGISTER_APPLICATION_REQUEST`:
    /// call the matching IPCP op, reply carries `is_register`.
    fn handle_reg_unreg_app(
        &self,
        hdr: MessageHeader,
        attrs: RegUnregAppAttrs,
        is_register: bool,
    ) -> KipcmResult<()> {
        let outcome = self.with_target_ipcp(hdr.dst_ipc_id, |instance| {
            if is_register {
                instance.ops().application_register(&attrs.app_name)
            } else {
                instance.ops().application_unregister(&attrs.app_name)
            }
        });
        let (id, result) = match outcome {
            Ok(()) => (hdr.dst_ipc_id.get(), 0),
            Err(HandlerError::TargetNotFound) => (0, -1),
            Err(HandlerError::Delegate(id)) => (id, -1),
        };
        self.transport.send(ControlReply::RegUnregResponse {
            id,
            result,
            seq: hdr.src_seq,
            is_register,
        })
    }

    /// Common epilogue for every handler: find the target IPCP, run `op`
    /// against it.
    fn with_target_ipcp(
        &self,
        id: IpcpId,
        op: impl FnOnce(&IpcpInstance) -> KipcmResult<()>,
    ) -> Result<(), HandlerError> {
        let state = self.lock_state();
        let instance = state.instances.find(id).ok_or(HandlerError::TargetNotFound)?;
        op(instance).map_err(|err| {
            error!(%id, %err, "IPCP delegate operation failed");
            HandlerError::Delegate(id.get())
        })
    }
}

#[derive(Debug)]
enum HandlerError {
    TargetNotFound,
    Delegate(u32),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::factory::IpcpFactoryOps;
    use crate::instance::IpcpOps;
    use crate::kfa::test_support::FakeKfa;
    use crate::messages::{MessageKind, RegUnregAppAttrs};
    use crate::transport::test_support::FakeTransport;
    use std::sync::Mutex as StdMutex;
    use tracing_test::traced_test;

    #[derive(Debug)]
    struct RecordingOps {
        calls: Arc<StdMutex<Vec<String>>>,
        fail: bool,
    }

    impl IpcpOps for RecordingOps {
        fn assign_to_dif(&self, dif_name: &str, dif_config: &str) -> KipcmResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("assign_to_dif({dif_name},{dif_config})"));
            if self.fail {
                Err(KipcmError::DelegateFail("forced".into()))
            } else {
                Ok(())
            }
        }
        fn application_register(&self, app_name: &str) -> KipcmResult<()> {
            self.calls.lock().unwrap().push(format!("register({app_name})"));
            Ok(())
        }
        fn application_unregister(&self, app_name: &str) -> KipcmResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("unregister({app_name})"));
            Ok(())
        }
        fn flow_allocate_request(
            &self,
            source: &str,
            dest: &str,
            _flow_spec: &str,
            port_id: PortId,
            flow_id: FlowId,
        ) -> KipcmResult<()> {
            self.calls.lock().unwrap().push(format!(
                "flow_allocate_request({source},{dest},{port_id},{flow_id})"
            ));
            if self.fail {
                Err(KipcmError::DelegateFail("forced".into()))
            } else {
                Ok(())
            }
        }
        fn flow_allocate_response(
            &self,
            flow_id: FlowId,
            port_id: PortId,
            result: i32,
        ) -> KipcmResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("flow_allocate_response({flow_id},{port_id},{result})"));
            Ok(())
        }
        fn flow_deallocate(&self, port_id: PortId) -> KipcmResult<()> {
            self.calls.lock().unwrap().push(format!("flow_deallocate({port_id})"));
            Ok(())
        }
    }

    #[derive(Debug)]
    struct RecordingFactory {
        calls: Arc<StdMutex<Vec<String>>>,
        fail_create: bool,
    }

    impl IpcpFactoryOps for RecordingFactory {
        fn create(&self, name: &str, id: IpcpId) -> Option<Box<dyn IpcpOps>> {
            if self.fail_create {
                return None;
            }
            self.calls.lock().unwrap().push(format!("create({name},{id})"));
            Some(Box::new(RecordingOps {
                calls: self.calls.clone(),
                fail: false,
            }))
        }

        fn destroy(&self, _instance: Box<dyn IpcpOps>) -> KipcmResult<()> {
            self.calls.lock().unwrap().push("destroy".to_string());
            Ok(())
        }
    }

    fn build_kipcm() -> (Arc<Kipcm>, Arc<FakeTransport>, Arc<StdMutex<Vec<String>>>) {
        let transport = Arc::new(FakeTransport::new());
        let kfa = Arc::new(FakeKfa::new());
        let kipcm = Kipcm::create(KipcmConfig::default(), kfa, transport.clone()).unwrap();
        let calls = Arc::new(StdMutex::new(Vec::new()));
        kipcm
            .factory_register(
                "normal-ipc",
                Arc::new(RecordingFactory {
                    calls: calls.clone(),
                    fail_create: false,
                }),
            )
            .unwrap();
        (kipcm, transport, calls)
    }

    #[test]
    fn create_registers_six_handlers() {
        let (_kipcm, transport, _calls) = build_kipcm();
        assert_eq!(transport.registered_kinds().len(), MessageKind::ALL.len());
    }

    #[test]
    fn ipcp_create_then_destroy_round_trips() {
        let (kipcm, _transport, calls) = build_kipcm();
        let id = IpcpId::new_checked(3).unwrap();
        kipcm.ipcp_create("shim0", id, None).unwrap();
        assert!(calls.lock().unwrap().iter().any(|c| c.starts_with("create")));
        kipcm.ipcp_destroy(id).unwrap();
        assert!(calls.lock().unwrap().iter().any(|c| c == "destroy"));
    }

    #[test]
    fn ipcp_create_duplicate_id_fails() {
        let (kipcm, _transport, _calls) = build_kipcm();
        let id = IpcpId::new_checked(5).unwrap();
        kipcm.ipcp_create("shim0", id, None).unwrap();
        let err = kipcm.ipcp_create("shim1", id, None).unwrap_err();
        assert!(matches!(err, KipcmError::AlreadyExists(_)));
    }

    #[test]
    fn outbound_allocate_success_delivers_result_on_flow_res() {
        let (kipcm, transport, _calls) = build_kipcm();
        let ipcp_id = IpcpId::new_checked(7).unwrap();
        kipcm.ipcp_create("shim0", ipcp_id, None).unwrap();

        let hdr = MessageHeader {
            dst_ipc_id: ipcp_id,
            src_seq: SeqNum::new_checked(42).unwrap(),
            src_port: 1,
        };
        let attrs = AllocateFlowRequestAttrs {
            source_name: "app-a".into(),
            dest_name: "app-b".into(),
            dif_name: "dif0".into(),
            flow_spec: "best-effort".into(),
            port_id: PortId::new_checked(101).unwrap(),
        };
        kipcm.handle_allocate_flow_request(hdr, attrs).unwrap();

        // No reply yet: the IPCP owns completing the transaction.
        assert!(transport.sent.lock().unwrap().is_empty());

        kipcm.flow_res(ipcp_id, FlowId::new_checked(1).unwrap(), 0).unwrap();
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            ControlReply::AllocateFlowResult { id, result, seq, .. } => {
                assert_eq!(*id, 7);
                assert_eq!(*result, 0);
                assert_eq!(*seq, SeqNum::new_checked(42).unwrap());
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn outbound_allocate_replies_error_when_ipcp_missing() {
        let (kipcm, transport, _calls) = build_kipcm();
        let hdr = MessageHeader {
            dst_ipc_id: IpcpId::new_checked(9).unwrap(),
            src_seq: SeqNum::new_checked(1).unwrap(),
            src_port: 1,
        };
        let attrs = AllocateFlowRequestAttrs {
            source_name: "app-a".into(),
            dest_name: "app-b".into(),
            dif_name: "dif0".into(),
            flow_spec: "best-effort".into(),
            port_id: PortId::new_checked(1).unwrap(),
        };
        kipcm.handle_allocate_flow_request(hdr, attrs).unwrap();
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            ControlReply::AllocateFlowResult { id, result, .. } => {
                assert_eq!(*id, 0);
                assert_eq!(*result, -1);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(kipcm.lock_state().flows.ingress.empty());
        // The IPCP lookup happens before any KFA flow is minted, so a
        // request for a nonexistent IPCP never mints one (S2).
        assert_eq!(kipcm.kfa.flow_create().unwrap(), FlowId::new_checked(1).unwrap());
    }

    #[test]
    fn inbound_allocate_round_trip_clears_egress_entry() {
        let (kipcm, transport, calls) = build_kipcm();
        let ipcp_id = IpcpId::new_checked(7).unwrap();
        kipcm.ipcp_create("shim0", ipcp_id, None).unwrap();

        let flow_id = kipcm.kfa.flow_create().unwrap();
        kipcm
            .flow_arrived(ipcp_id, flow_id, "dif0", "app-a", "app-b", "best-effort")
            .unwrap();

        let seq = match &transport.sent.lock().unwrap()[0] {
            ControlReply::AllocateFlowRequestArrived { seq, nl_port_id, .. } => {
                assert_eq!(*nl_port_id, 1);
                *seq
            }
            other => panic!("unexpected reply: {other:?}"),
        };
        assert!(!kipcm.lock_state().flows.egress.empty());

        let hdr = MessageHeader {
            dst_ipc_id: ipcp_id,
            src_seq: seq,
            src_port: 1,
        };
        let attrs = AllocateFlowResponseAttrs {
            port_id: PortId::new_checked(300).unwrap(),
            result: 0,
        };
        kipcm.handle_allocate_flow_response(hdr, attrs).unwrap();

        assert!(kipcm.lock_state().flows.egress.empty());
        assert!(
            calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.starts_with("flow_allocate_response"))
        );
    }

    #[test]
    #[traced_test]
    fn create_fails_cleanly_when_a_handler_is_already_registered() {
        let transport = Arc::new(FakeTransport::new());
        transport.pre_register(MessageKind::RegisterApplicationRequest);
        let kfa = Arc::new(FakeKfa::new());
        let kipcm = Kipcm::create(KipcmConfig::default(), kfa, transport.clone());
        assert!(kipcm.is_none());
        assert!(transport.registered_kinds().is_empty());
        assert!(logs_contain("rolling back"));
    }

    #[test]
    #[should_panic(expected = "live IPC process instances")]
    fn destroy_with_leaked_instance_panics_in_debug() {
        let (kipcm, _transport, _calls) = build_kipcm();
        kipcm.ipcp_create("shim0", IpcpId::new_checked(3).unwrap(), None).unwrap();
        let _ = kipcm.destroy();
    }

    #[test]
    fn double_flow_res_fails_not_found() {
        let (kipcm, _transport, _calls) = build_kipcm();
        let ipcp_id = IpcpId::new_checked(2).unwrap();
        kipcm.ipcp_create("shim0", ipcp_id, None).unwrap();
        let flow_id = FlowId::new_checked(11).unwrap();
        kipcm.lock_state().flows.ingress.add(flow_id, SeqNum::new_checked(5).unwrap()).unwrap();

        kipcm.flow_res(ipcp_id, flow_id, 0).unwrap();
        let err = kipcm.flow_res(ipcp_id, flow_id, 0).unwrap_err();
        assert!(matches!(err, KipcmError::NotFound(_)));
    }

    #[test]
    fn concurrent_ipcp_create_collision_exactly_one_wins() {
        let (kipcm, _transport, _calls) = build_kipcm();
        let id = IpcpId::new_checked(5).unwrap();
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let kipcm = Arc::clone(&kipcm);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    kipcm.ipcp_create(&format!("shim{i}"), id, None)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let collisions = results
            .iter()
            .filter(|r| matches!(r, Err(KipcmError::AlreadyExists(_))))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(collisions, 1);
        assert!(kipcm.lock_state().instances.find(id).is_some());
        assert_eq!(kipcm.lock_state().instances.len(), 1);
    }

    #[concurrency_mode(shuttle)]
    mod shuttle_tests {
        use super::*;
        use shuttle::thread;

        fn run_shuttle(f: impl Fn() + Sync + Send + 'static) {
            let mut config = shuttle::Config::new();
            config.stack_size = 1024 * 1024;
            let runner = shuttle::Runner::new(shuttle::scheduler::RandomScheduler::new(50), config);
            runner.run(f);
        }

        /// Model-checked counterpart of `concurrent_ipcp_create_collision_exactly_one_wins`:
        /// shuttle's scheduler exhaustively varies the interleaving of the two racing
        /// `ipcp_create` calls across the facade's mutex instead of relying on the host
        /// OS scheduler to happen to hit the interesting orderings.
        #[test]
        fn concurrent_ipcp_create_collision_exactly_one_wins() {
            run_shuttle(|| {
                let (kipcm, _transport, _calls) = build_kipcm();
                let id = IpcpId::new_checked(5).unwrap();

                let handles: Vec<_> = (0..2)
                    .map(|i| {
                        let kipcm = Arc::clone(&kipcm);
                        thread::spawn(move || kipcm.ipcp_create(&format!("shim{i}"), id, None))
                    })
                    .collect();

                let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
                let successes = results.iter().filter(|r| r.is_ok()).count();
                let collisions = results
                    .iter()
                    .filter(|r| matches!(r, Err(KipcmError::AlreadyExists(_))))
                    .count();
                assert_eq!(successes, 1);
                assert_eq!(collisions, 1);
            });
        }
    }

    #[test]
    fn assign_to_dif_passes_parsed_config() {
        let (kipcm, transport, calls) = build_kipcm();
        let ipcp_id = IpcpId::new_checked(4).unwrap();
        kipcm.ipcp_create("shim0", ipcp_id, None).unwrap();
        let hdr = MessageHeader {
            dst_ipc_id: ipcp_id,
            src_seq: SeqNum::new_checked(1).unwrap(),
            src_port: 1,
        };
        kipcm
            .handle_assign_to_dif(
                hdr,
                AssignToDifAttrs {
                    dif_name: "dif0".into(),
                    dif_config: "addr-family=v4".into(),
                },
            )
            .unwrap();
        assert!(
            calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c == "assign_to_dif(dif0,addr-family=v4)")
        );
        match &transport.sent.lock().unwrap()[0] {
            ControlReply::AssignToDifResponse { result, .. } => assert_eq!(*result, 0),
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
