// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Control-message kinds and attribute payloads exchanged with the
//! external control transport (RNL, out of scope for this crate).

use crate::id::{IpcpId, PortId, SeqNum};

/// A control-transport message header, common to every request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// The IPCP this message targets.
    pub dst_ipc_id: IpcpId,
    /// The requester's sequence number, used to correlate the reply.
    pub src_seq: SeqNum,
    /// The requester's port on the control transport itself (not a data
    /// plane [`PortId`]).
    pub src_port: u32,
}

/// Attributes of an `ASSIGN_TO_DIF_REQUEST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignToDifAttrs {
    pub dif_name: String,
    pub dif_config: String,
}

/// Attributes of an `ALLOCATE_FLOW_REQUEST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocateFlowRequestAttrs {
    pub source_name: String,
    pub dest_name: String,
    pub dif_name: String,
    pub flow_spec: String,
    pub port_id: PortId,
}

/// Attributes of an `ALLOCATE_FLOW_RESPONSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocateFlowResponseAttrs {
    pub port_id: PortId,
    pub result: i32,
}

/// Attributes of a `DEALLOCATE_FLOW_REQUEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeallocateFlowRequestAttrs {
    pub port_id: PortId,
}

/// Attributes shared by `REGISTER_APPLICATION_REQUEST` and
/// `UNREGISTER_APPLICATION_REQUEST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegUnregAppAttrs {
    pub app_name: String,
    pub dif_name: String,
}

/// The six request kinds the dispatcher accepts, each carrying a
/// [`MessageHeader`] plus its typed attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    AssignToDif(MessageHeader, AssignToDifAttrs),
    AllocateFlowRequest(MessageHeader, AllocateFlowRequestAttrs),
    AllocateFlowResponse(MessageHeader, AllocateFlowResponseAttrs),
    DeallocateFlowRequest(MessageHeader, DeallocateFlowRequestAttrs),
    RegisterApplication(MessageHeader, RegUnregAppAttrs),
    UnregisterApplication(MessageHeader, RegUnregAppAttrs),
}

/// The kind of a [`ControlRequest`], used to key the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    AssignToDifRequest,
    AllocateFlowRequest,
    AllocateFlowResponse,
    DeallocateFlowRequest,
    RegisterApplicationRequest,
    UnregisterApplicationRequest,
}

impl MessageKind {
    /// All six kinds the dispatcher must register handlers for, in the
    /// canonical installation order.
    pub const ALL: [MessageKind; 6] = [
        MessageKind::AssignToDifRequest,
        MessageKind::AllocateFlowRequest,
        MessageKind::AllocateFlowResponse,
        MessageKind::RegisterApplicationRequest,
        MessageKind::UnregisterApplicationRequest,
        MessageKind::DeallocateFlowRequest,
    ];
}

impl ControlRequest {
    /// The kind of this request.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            ControlRequest::AssignToDif(..) => MessageKind::AssignToDifRequest,
            ControlRequest::AllocateFlowRequest(..) => MessageKind::AllocateFlowRequest,
            ControlRequest::AllocateFlowResponse(..) => MessageKind::AllocateFlowResponse,
            ControlRequest::DeallocateFlowRequest(..) => MessageKind::DeallocateFlowRequest,
            ControlRequest::RegisterApplication(..) => MessageKind::RegisterApplicationRequest,
            ControlRequest::UnregisterApplication(..) => MessageKind::UnregisterApplicationRequest,
        }
    }

    /// The common header of this request.
    #[must_use]
    pub fn header(&self) -> MessageHeader {
        match self {
            ControlRequest::AssignToDif(hdr, _)
            | ControlRequest::AllocateFlowRequest(hdr, _)
            | ControlRequest::AllocateFlowResponse(hdr, _)
            | ControlRequest::DeallocateFlowRequest(hdr, _)
            | ControlRequest::RegisterApplication(hdr, _)
            | ControlRequest::UnregisterApplication(hdr, _) => *hdr,
        }
    }
}

/// Outbound reply/notification messages the KIPCM emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    /// Reply to `ASSIGN_TO_DIF_REQUEST`.
    AssignToDifResponse { id: u32, result: i32, seq: SeqNum },
    /// Eventual (or immediate-error) result of an outbound flow allocation.
    AllocateFlowResult {
        id: u32,
        result: i32,
        seq: SeqNum,
        port_id: u32,
    },
    /// Reply to `DEALLOCATE_FLOW_REQUEST`.
    DeallocateFlowResponse { id: u32, result: i32, seq: SeqNum },
    /// Reply to register/unregister application requests.
    RegUnregResponse {
        id: u32,
        result: i32,
        seq: SeqNum,
        is_register: bool,
    },
    /// Unsolicited notification that a peer-initiated flow has arrived,
    /// bound to the fixed notification channel (`nl_port_id = 1`).
    AllocateFlowRequestArrived {
        id: u32,
        dif_name: String,
        source: String,
        dest: String,
        flow_spec: String,
        seq: SeqNum,
        nl_port_id: u32,
    },
}
