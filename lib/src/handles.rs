//! Guest-visible resource handles.
//!
//! Each resource table has its own handle type, so a handle minted by one table can never be
//! handed to another by mistake. The raw value `0` is reserved by every table and never refers to
//! a live resource.

use cranelift_entity::entity_impl;

/// Macro which provides the common implementation of a handle type.
macro_rules! handle_impl {
    ($(#[$attr:meta])* $entity:ident, $display_prefix:expr) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $entity(u32);

        entity_impl!($entity, $display_prefix);

        impl $entity {
            /// The reserved handle, which never resolves.
            pub const RESERVED: $entity = $entity(0);

            /// Whether this is the reserved "no value" handle.
            pub fn is_reserved(self) -> bool {
                self.0 == 0
            }
        }

        // Guests may pass any bit pattern. `u32::MAX` is the entity sentinel value, so it is
        // folded into the reserved handle rather than constructed.
        impl From<u32> for $entity {
            fn from(raw: u32) -> Self {
                if raw == u32::MAX {
                    Self::RESERVED
                } else {
                    $entity(raw)
                }
            }
        }

        impl From<$entity> for u32 {
            fn from(handle: $entity) -> u32 {
                handle.0
            }
        }
    };
}

handle_impl!(
    /// A handle to a header collection.
    FieldsHandle,
    "fields"
);

handle_impl!(
    /// A handle to an outgoing or incoming request.
    RequestHandle,
    "request"
);

handle_impl!(
    /// A handle to an incoming or outgoing response. Also used as an always-ready future.
    ResponseHandle,
    "response"
);

handle_impl!(
    /// A handle to an outgoing body.
    BodyHandle,
    "body"
);

handle_impl!(
    /// A handle to an input or output stream.
    StreamHandle,
    "stream"
);

handle_impl!(
    /// A handle to a one-shot response outparam.
    OutparamHandle,
    "outparam"
);
