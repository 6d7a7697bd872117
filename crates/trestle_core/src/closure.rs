use crate::handle::Handle;

/// Name of the guest export used to dispatch numerically addressed closures.
/// The closure reference is passed to it as the first tagged word.
pub const DISPATCH_EXPORT: &str = "invoke_closure";

/// Reference to a guest callable, usable for later invocation from a host
/// event. Two addressing modes: by export name (resolved at call time) or by
/// numeric closure-table index routed through [`DISPATCH_EXPORT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosureRef {
    Export(String),
    Indexed(u32),
}

/// A registered completion callback together with the context handles to be
/// appended after the result handle when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callback {
    pub closure: ClosureRef,
    pub extras: Vec<Handle>,
}

impl Callback {
    pub fn new(closure: ClosureRef) -> Self {
        Self {
            closure,
            extras: Vec::new(),
        }
    }

    pub fn with_extras(closure: ClosureRef, extras: Vec<Handle>) -> Self {
        Self { closure, extras }
    }
}
