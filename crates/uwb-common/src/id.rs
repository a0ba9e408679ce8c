//! Identity types for devices, environments and stored records.
//!
//! All identifiers are opaque strings issued by the query service. The
//! newtypes only exist so that a serial number can never be passed where a
//! device id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create from anything string-like.
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }
    };
}

string_id!(
    /// Hardware serial number as reported on the wire.
    SerialNumber
);
string_id!(
    /// Device identity resolved from a serial number.
    DeviceId
);
string_id!(
    /// Environment (site) identifier.
    EnvironmentId
);
string_id!(
    /// Coordinate space identifier.
    CoordinateSpaceId
);
string_id!(
    /// Device ↔ environment assignment identifier.
    AssignmentId
);
string_id!(
    /// Stored raw datapoint identifier.
    DatapointId
);
string_id!(
    /// Identifier of a record created in the query service.
    RecordId
);
