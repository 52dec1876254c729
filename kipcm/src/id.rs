// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed identifiers used across the KIPCM control plane.
//!
//! Each identifier is a transparent, non-zero wrapper so that the four id
//! spaces (`IpcpId`, `PortId`, `FlowId`, `SeqNum`) cannot be confused with
//! one another or with a raw integer at compile time.

use std::fmt::{Display, Formatter};
use std::num::NonZero;

macro_rules! typed_id {
    ($name:ident, $repr:ty, $err:ident, $doc:literal) => {
        #[doc = $doc]
        #[repr(transparent)]
        #[cfg_attr(test, derive(bolero::TypeGenerator))]
        #[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
        pub struct $name(NonZero<$repr>);

        #[doc = concat!("Error constructing a [`", stringify!($name), "`].")]
        #[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, thiserror::Error)]
        pub enum $err {
            /// The reference protocol reserves zero; it is never a valid id.
            #[error(concat!(stringify!($name), " must be non-zero"))]
            Zero,
        }

        impl $name {
            /// Create a
            #[doc = concat!("[`", stringify!($name), "`]")]
            /// from an already non-zero value.
            #[must_use]
            pub const fn new(value: NonZero<$repr>) -> $name {
                $name(value)
            }

            /// Create a
            #[doc = concat!("[`", stringify!($name), "`]")]
            /// from a raw value, rejecting zero.
            ///
            /// # Errors
            ///
            /// Returns
            #[doc = concat!("[`", stringify!($err), "::Zero`]")]
            /// if `value` is zero.
            pub const fn new_checked(value: $repr) -> Result<$name, $err> {
                match NonZero::new(value) {
                    None => Err($err::Zero),
                    Some(value) => Ok($name(value)),
                }
            }

            /// Return the raw value.
            #[must_use]
            pub const fn get(self) -> $repr {
                self.0.get()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                Display::fmt(&self.0.get(), f)
            }
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> Self {
                value.0.get()
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = $err;

            fn try_from(value: $repr) -> Result<Self, Self::Error> {
                Self::new_checked(value)
            }
        }
    };
}

typed_id!(
    IpcpId,
    u32,
    IpcpIdError,
    "Identifier of an IPC process instance, chosen by the caller."
);
typed_id!(
    PortId,
    u32,
    PortIdError,
    "Identifier of a bound flow endpoint, visible to applications."
);
typed_id!(
    FlowId,
    u32,
    FlowIdError,
    "Internal flow handle minted by the KIPCM/KFA, preceding port binding."
);
typed_id!(
    SeqNum,
    u64,
    SeqNumError,
    "Control-transport request identifier used to correlate requests and responses."
);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;

    #[test]
    fn rejects_zero() {
        assert_eq!(IpcpId::new_checked(0), Err(IpcpIdError::Zero));
        assert_eq!(PortId::new_checked(0), Err(PortIdError::Zero));
        assert_eq!(FlowId::new_checked(0), Err(FlowIdError::Zero));
        assert_eq!(SeqNum::new_checked(0), Err(SeqNumError::Zero));
    }

    #[test]
    fn accepts_nonzero_and_round_trips() {
        let id = IpcpId::new_checked(7).unwrap();
        assert_eq!(id.get(), 7);
        assert_eq!(u32::from(id), 7);
        assert_eq!(IpcpId::try_from(7u32).unwrap(), id);
    }

    #[test]
    fn distinct_types_do_not_compare() {
        // This is a compile-time guarantee; the test documents the intent.
        let ipcp = IpcpId::new_checked(1).unwrap();
        let port = PortId::new_checked(1).unwrap();
        assert_eq!(ipcp.get(), port.get());
    }

    #[test]
    fn checked_constructors_are_total() {
        bolero::check!().with_type().for_each(|x: &u32| {
            match IpcpId::new_checked(*x) {
                Ok(id) => assert_eq!(id.get(), *x),
                Err(IpcpIdError::Zero) => assert_eq!(*x, 0),
            }
        });
    }
}
