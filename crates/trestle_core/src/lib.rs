//! Boundary data model for the Trestle guest/host bridge: handles, tagged
//! words, closure references, and the fatal-error vocabulary.

pub mod closure;
pub mod error;
pub mod handle;
pub mod tagged;

pub use closure::{Callback, ClosureRef, DISPATCH_EXPORT};
pub use error::{bridge_error, BridgeError};
pub use handle::{Handle, HandleTable, HostObject, ImageObject};
pub use tagged::{decode, Arg, Decoded};
