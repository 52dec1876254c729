// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The control-transport collaborator.
//!
//! Out of scope for this crate: wire (de)serialization of control
//! messages. [`ControlTransport`] is the boundary the dispatcher and
//! handlers call across; a concrete implementation owns a netlink (or
//! other) socket and the actual encode/decode.

use crate::error::KipcmResult;
use crate::id::SeqNum;
use crate::messages::{ControlReply, MessageKind};
use std::fmt::Debug;

/// A handler installed on the control transport for one [`MessageKind`].
///
/// The closure carries the owning `Kipcm` as its datum, as the reference
/// source's callbacks carry `kipcm` via `data`.
pub type HandlerFn = Box<dyn Fn(crate::messages::ControlRequest) -> KipcmResult<()> + Send + Sync>;

/// The external control transport: registers per-kind handlers, allocates
/// sequence numbers for outbound notifications, and sends replies.
pub trait ControlTransport: Debug + Send + Sync {
    /// Install a handler for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KipcmError::TransportFail`] if the
    /// transport's handler set already has an entry for `kind`, or the
    /// registration otherwise fails.
    fn register_handler(&self, kind: MessageKind, handler: HandlerFn) -> KipcmResult<()>;

    /// Remove the handler previously installed for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KipcmError::TransportFail`] if no handler
    /// was installed for `kind`, or removal otherwise fails.
    fn unregister_handler(&self, kind: MessageKind) -> KipcmResult<()>;

    /// Allocate the next outbound sequence number on this transport
    /// (used to correlate an unsolicited notification with its eventual
    /// application reply).
    fn next_seq_num(&self) -> SeqNum;

    /// Send a reply or notification.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KipcmError::TransportFail`] if the
    /// underlying send fails.
    fn send(&self, reply: ControlReply) -> KipcmResult<()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::KipcmError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// An in-memory [`ControlTransport`] double for tests: records every
    /// reply sent and lets tests assert on handler registration.
    #[derive(Debug, Default)]
    pub struct FakeTransport {
        handlers: Mutex<HashMap<MessageKind, ()>>,
        pub sent: Mutex<Vec<ControlReply>>,
        next_seq: AtomicU64,
        pub fail_register_for: Mutex<Option<MessageKind>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self {
                handlers: Mutex::new(HashMap::new()),
                sent: Mutex::new(Vec::new()),
                next_seq: AtomicU64::new(1),
                fail_register_for: Mutex::new(None),
            }
        }

        pub fn registered_kinds(&self) -> Vec<MessageKind> {
            self.handlers.lock().unwrap().keys().copied().collect()
        }

        pub fn pre_register(&self, kind: MessageKind) {
            self.handlers.lock().unwrap().insert(kind, ());
        }
    }

    impl ControlTransport for FakeTransport {
        fn register_handler(&self, kind: MessageKind, _handler: HandlerFn) -> KipcmResult<()> {
            if *self.fail_register_for.lock().unwrap() == Some(kind) {
                return Err(KipcmError::TransportFail(format!(
                    "forced failure registering {kind:?}"
                )));
            }
            let mut handlers = self.handlers.lock().unwrap();
            if handlers.contains_key(&kind) {
                return Err(KipcmError::TransportFail(format!(
                    "{kind:?} already registered"
                )));
            }
            handlers.insert(kind, ());
            Ok(())
        }

        fn unregister_handler(&self, kind: MessageKind) -> KipcmResult<()> {
            self.handlers
                .lock()
                .unwrap()
                .remove(&kind)
                .map(|()| ())
                .ok_or_else(|| KipcmError::TransportFail(format!("{kind:?} was not registered")))
        }

        fn next_seq_num(&self) -> SeqNum {
            let value = self.next_seq.fetch_add(1, Ordering::SeqCst);
            SeqNum::new_checked(value).expect("counter starts at 1 and only increases")
        }

        fn send(&self, reply: ControlReply) -> KipcmResult<()> {
            self.sent.lock().unwrap().push(reply);
            Ok(())
        }
    }
}
