use crate::closure::Callback;
use crate::error::{bridge_error, BridgeError, HANDLE_KIND_MISMATCH, INVALID_HANDLE};

/// Opaque host-issued identifier. The guest only ever holds the integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    pub fn from_u32(value: u32) -> Self {
        Self(value)
    }

    pub fn from_i32(value: i32) -> Self {
        Self(value as u32)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_i32(self) -> i32 {
        self.0 as i32
    }
}

/// Host-side image object. Callbacks are looked up when the completion event
/// is pumped, so registration order relative to `image_set_src` is free.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageObject {
    pub src: Option<String>,
    pub onload: Option<Callback>,
    pub onerror: Option<Callback>,
}

/// A typed slot in the handle table. The original host kept one untyped
/// ever-growing array; the kind tag turns a mismatched access into a loud
/// error instead of trusting the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostObject {
    Null,
    Window,
    Document,
    Element { id: String },
    Context2d { element: String },
    Image(ImageObject),
    Text(String),
}

impl HostObject {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HostObject::Null => "null",
            HostObject::Window => "window",
            HostObject::Document => "document",
            HostObject::Element { .. } => "element",
            HostObject::Context2d { .. } => "context2d",
            HostObject::Image(_) => "image",
            HostObject::Text(_) => "text",
        }
    }
}

/// Append-only store of host-side values the guest knows only by index.
/// Handles are issued monotonically from 0 and never reused or freed; for a
/// long-running guest this grows without bound (documented limitation, there
/// is deliberately no `remove`).
#[derive(Debug, Default)]
pub struct HandleTable {
    slots: Vec<HostObject>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn insert(&mut self, object: HostObject) -> Handle {
        let id = self.slots.len() as u32;
        self.slots.push(object);
        Handle(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, handle: Handle) -> Result<&HostObject, BridgeError> {
        self.slots
            .get(handle.0 as usize)
            .ok_or_else(|| invalid_handle(handle))
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut HostObject, BridgeError> {
        self.slots
            .get_mut(handle.0 as usize)
            .ok_or_else(|| invalid_handle(handle))
    }

    pub fn text(&self, handle: Handle) -> Result<&str, BridgeError> {
        match self.get(handle)? {
            HostObject::Text(value) => Ok(value),
            other => Err(kind_mismatch(handle, "text", other)),
        }
    }

    pub fn image(&self, handle: Handle) -> Result<&ImageObject, BridgeError> {
        match self.get(handle)? {
            HostObject::Image(image) => Ok(image),
            other => Err(kind_mismatch(handle, "image", other)),
        }
    }

    pub fn image_mut(&mut self, handle: Handle) -> Result<&mut ImageObject, BridgeError> {
        match self.get_mut(handle)? {
            HostObject::Image(image) => Ok(image),
            other => Err(kind_mismatch(handle, "image", other)),
        }
    }

    pub fn element_id(&self, handle: Handle) -> Result<&str, BridgeError> {
        match self.get(handle)? {
            HostObject::Element { id } => Ok(id),
            other => Err(kind_mismatch(handle, "element", other)),
        }
    }

    pub fn context_element(&self, handle: Handle) -> Result<&str, BridgeError> {
        match self.get(handle)? {
            HostObject::Context2d { element } => Ok(element),
            other => Err(kind_mismatch(handle, "context2d", other)),
        }
    }

    pub fn document(&self, handle: Handle) -> Result<(), BridgeError> {
        match self.get(handle)? {
            HostObject::Document => Ok(()),
            other => Err(kind_mismatch(handle, "document", other)),
        }
    }
}

fn invalid_handle(handle: Handle) -> BridgeError {
    bridge_error(INVALID_HANDLE, format!("invalid handle {}", handle.0))
}

fn kind_mismatch(handle: Handle, expected: &str, found: &HostObject) -> BridgeError {
    bridge_error(
        HANDLE_KIND_MISMATCH,
        format!(
            "handle {} holds {}, expected {expected}",
            handle.0,
            found.kind_name()
        ),
    )
}
