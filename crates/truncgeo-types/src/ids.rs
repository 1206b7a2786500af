//! Opaque 32-byte identifiers.
//!
//! A [`PoolId`] scopes one independent observation log and policy. A
//! [`WriterId`] names the single principal allowed to append to a pool.
//! Both serialize as lowercase hex.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::TypesError;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[serde_as]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(#[serde_as(as = "serde_with::hex::Hex")] [u8; 32]);

        impl $name {
            /// Wrap raw identifier bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Derive an identifier by hashing a human-readable label.
            pub fn derive(label: &[u8]) -> Self {
                Self(*blake3::hash(label).as_bytes())
            }

            /// Raw identifier bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Parse an identifier from a byte slice of exactly 32 bytes.
            pub fn try_from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
                let arr: [u8; 32] = bytes.try_into().map_err(|_| TypesError::InvalidLength {
                    expected: 32,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}..)", stringify!($name), &hex::encode(self.0)[..8])
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s.trim_start_matches("0x"))?;
                Self::try_from_slice(&bytes)
            }
        }
    };
}

opaque_id!(
    /// Opaque identifier of a tracked market.
    PoolId
);

opaque_id!(
    /// Identity of the principal authorized to write to a pool.
    WriterId
);
