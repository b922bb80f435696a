//! Attribute TLVs and their typed values.
//!
//! An [`Attribute`] is always kept as raw bytes; the dictionary decides which
//! [`AttributeKind`] interprets them, so a value that fails to decode never
//! invalidates the packet that carried it.

mod attribute;
mod types;
mod value;
mod vendor;

pub use attribute::{Attribute, AttributeError};
pub use types::{AttributeCode, microsoft};
pub use value::{AttributeKind, AttributeValue};
pub use vendor::VendorSpecific;
