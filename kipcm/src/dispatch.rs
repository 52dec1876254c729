// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Handler dispatch table: installs the six transaction handlers on the
//! control transport, atomically.

use crate::error::{KipcmError, KipcmResult};
use crate::messages::MessageKind;
use crate::transport::{ControlTransport, HandlerFn};
use tracing::{error, warn};

/// Install all six handlers on `transport`.
///
/// All-or-nothing: if the Nth registration fails, every handler installed
/// by the previous N-1 calls is unregistered before returning the error.
/// If an unregister performed during that rollback itself fails, the
/// failure is logged and the rollback continues through the remaining
/// prior successes. It never aborts partway, so a late registration
/// failure can never leave an earlier handler dangling.
///
/// # Errors
///
/// Returns the first registration failure encountered.
pub fn register_all<T, F>(transport: &T, mut handler_for: F) -> KipcmResult<()>
where
    T: ControlTransport + ?Sized,
    F: FnMut(MessageKind) -> HandlerFn,
{
    let mut installed = Vec::with_capacity(MessageKind::ALL.len());
    for kind in MessageKind::ALL {
        match transport.register_handler(kind, handler_for(kind)) {
            Ok(()) => installed.push(kind),
            Err(err) => {
                error!(?kind, %err, "failed to register control handler, rolling back");
                rollback(transport, &installed);
                return Err(err);
            }
        }
    }
    Ok(())
}

fn rollback<T: ControlTransport + ?Sized>(transport: &T, installed: &[MessageKind]) {
    for &kind in installed {
        if let Err(err) = transport.unregister_handler(kind) {
            warn!(?kind, %err, "failed to unregister handler during rollback, continuing");
        }
    }
}

/// Remove all six handlers from `transport`.
///
/// Every kind is attempted regardless of earlier failures; the returned
/// result aggregates into an error if any single unregistration failed.
///
/// # Errors
///
/// Returns [`KipcmError::TransportFail`] naming every kind that failed to
/// unregister, if any did.
pub fn unregister_all<T: ControlTransport + ?Sized>(transport: &T) -> KipcmResult<()> {
    let mut failed = Vec::new();
    for kind in MessageKind::ALL {
        if let Err(err) = transport.unregister_handler(kind) {
            error!(?kind, %err, "failed to unregister control handler");
            failed.push(kind);
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        Err(KipcmError::TransportFail(format!(
            "failed to unregister: {failed:?}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::transport::test_support::FakeTransport;

    fn noop_handler(_kind: MessageKind) -> HandlerFn {
        Box::new(|_req| Ok(()))
    }

    #[test]
    fn register_all_installs_all_six() {
        let transport = FakeTransport::new();
        register_all(&transport, noop_handler).unwrap();
        assert_eq!(transport.registered_kinds().len(), MessageKind::ALL.len());
    }

    #[test]
    fn register_all_rolls_back_all_prior_successes_on_failure() {
        let transport = FakeTransport::new();
        // Pre-register the 4th kind installed so register_all fails there.
        transport.pre_register(MessageKind::ALL[3]);
        let err = register_all(&transport, noop_handler);
        assert!(err.is_err());
        assert_eq!(transport.registered_kinds(), vec![MessageKind::ALL[3]]);
    }

    #[test]
    fn unregister_all_attempts_every_kind_even_if_one_fails() {
        let transport = FakeTransport::new();
        register_all(&transport, noop_handler).unwrap();
        // Simulate one handler having already vanished out from under us.
        transport.unregister_handler(MessageKind::ALL[2]).unwrap();
        let result = unregister_all(&transport);
        assert!(result.is_err());
        assert!(transport.registered_kinds().is_empty());
    }
}
