// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Error model for the KIPCM control plane.
//!
//! One variant per failure kind, each carrying enough context to be
//! logged usefully. [`KipcmError`] maps onto the conventional
//! "0 success / negative errno" scheme via [`KipcmError::as_errno`].

use crate::id::{FlowId, IpcpId, PortId};
use std::fmt::Debug;

/// Errors produced by the KIPCM control plane.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KipcmError {
    /// A bogus pointer, malformed identifier, or missing context was supplied.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// An allocation failed while building the request's attribute block.
    #[error("allocation failure while handling request")]
    AllocFail,

    /// The control message could not be parsed into its typed attributes.
    #[error("failed to parse control message")]
    ParseFail,

    /// An IPCP id, factory name, flow id, or sequence number was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A duplicate id or factory name was supplied.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A factory cannot be unregistered while instances still reference it.
    #[error("factory '{0}' is still in use by {1} instance(s)")]
    InUse(String, usize),

    /// The underlying IPCP or KFA operation returned failure.
    #[error("delegate operation failed: {0}")]
    DelegateFail(String),

    /// Sending a reply or notification on the control transport failed.
    #[error("transport failure: {0}")]
    TransportFail(String),
}

impl KipcmError {
    /// Map this error onto the conventional zero-success/negative-errno
    /// scheme, using the `errno` crate's named constants rather than ad
    /// hoc magic numbers.
    #[must_use]
    pub fn as_errno(&self) -> i32 {
        match self {
            KipcmError::InvalidArg(_) => -errno::EINVAL,
            KipcmError::AllocFail => -errno::ENOMEM,
            KipcmError::ParseFail => -errno::EPROTO,
            KipcmError::NotFound(_) => -errno::ENOENT,
            KipcmError::AlreadyExists(_) => -errno::EEXIST,
            KipcmError::InUse(..) => -errno::EBUSY,
            KipcmError::DelegateFail(_) => -errno::EIO,
            KipcmError::TransportFail(_) => -errno::EIO,
        }
    }
}

/// Convenience constructors tying an error to the identifier that caused it.
impl KipcmError {
    pub(crate) fn ipcp_not_found(id: IpcpId) -> Self {
        KipcmError::NotFound(format!("IPC process {id}"))
    }

    pub(crate) fn flow_not_found(id: FlowId) -> Self {
        KipcmError::NotFound(format!("flow {id}"))
    }

    pub(crate) fn port_not_found(id: PortId) -> Self {
        KipcmError::NotFound(format!("port {id}"))
    }

    pub(crate) fn factory_not_found(name: &str) -> Self {
        KipcmError::NotFound(format!("factory '{name}'"))
    }
}

/// Result alias used throughout the crate.
pub type KipcmResult<T> = Result<T, KipcmError>;
