use std::fmt;

/// Fatal bridge error. Every failure that terminates a guest run carries a
/// stable code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeError {
    pub code: &'static str,
    pub message: String,
}

pub fn bridge_error(code: &'static str, message: impl Into<String>) -> BridgeError {
    BridgeError {
        code,
        message: message.into(),
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for BridgeError {}

pub const INVALID_HANDLE: &str = "E0501";
pub const HANDLE_KIND_MISMATCH: &str = "E0502";
pub const MEMORY_RANGE: &str = "E0503";
pub const MISSING_EXPORT: &str = "E0504";
pub const CALLBACK_ARITY: &str = "E0505";
pub const UNSUPPORTED_FD: &str = "E0506";
pub const IOVEC_COUNT: &str = "E0507";
pub const ABORT: &str = "E0508";
pub const GUEST_REENTRY: &str = "E0509";
pub const INSTANTIATION: &str = "E0510";
pub const RUNTIME_TRAP: &str = "E0511";
pub const MODULE_COMPILE: &str = "E0512";
pub const BAD_CLOSURE_WORD: &str = "E0513";

/// Marker prefix used when a host function raises a fatal condition from
/// inside a wasmtime call. The engine crate parses it back out of the trap's
/// error chain to recover the original code.
pub const TRAP_MARKER: &str = "bridge_trap:";

/// Formats a fatal condition for transport through an `anyhow` trap.
pub fn trap_message(code: &'static str, message: impl AsRef<str>) -> String {
    format!("{TRAP_MARKER}{code} {}", message.as_ref())
}

/// Recovers `(code, message)` from a message produced by [`trap_message`].
pub fn parse_trap_message(message: &str) -> Option<(&'static str, String)> {
    let idx = message.find(TRAP_MARKER)?;
    let rest = &message[idx + TRAP_MARKER.len()..];
    let (code, tail) = rest.split_once(' ').unwrap_or((rest, ""));
    let code = match code {
        INVALID_HANDLE => INVALID_HANDLE,
        HANDLE_KIND_MISMATCH => HANDLE_KIND_MISMATCH,
        MEMORY_RANGE => MEMORY_RANGE,
        MISSING_EXPORT => MISSING_EXPORT,
        CALLBACK_ARITY => CALLBACK_ARITY,
        UNSUPPORTED_FD => UNSUPPORTED_FD,
        IOVEC_COUNT => IOVEC_COUNT,
        ABORT => ABORT,
        GUEST_REENTRY => GUEST_REENTRY,
        INSTANTIATION => INSTANTIATION,
        RUNTIME_TRAP => RUNTIME_TRAP,
        MODULE_COMPILE => MODULE_COMPILE,
        BAD_CLOSURE_WORD => BAD_CLOSURE_WORD,
        _ => return None,
    };
    Some((code, tail.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_message_roundtrip() {
        let raw = trap_message(UNSUPPORTED_FD, "fd=0 is not supported");
        let (code, message) = parse_trap_message(&raw).unwrap();
        assert_eq!(code, UNSUPPORTED_FD);
        assert_eq!(message, "fd=0 is not supported");
    }

    #[test]
    fn parse_trap_message_rejects_unknown_code() {
        assert!(parse_trap_message("bridge_trap:E9999 nope").is_none());
        assert!(parse_trap_message("unrelated error text").is_none());
    }

    #[test]
    fn parse_trap_message_finds_marker_mid_string() {
        let wrapped = format!("outer context: {}", trap_message(ABORT, "abort called"));
        let (code, _) = parse_trap_message(&wrapped).unwrap();
        assert_eq!(code, ABORT);
    }
}
