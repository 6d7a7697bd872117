use crate::handle::Handle;
use std::fmt;

// Wire layout: low 32 bits carry the kind discriminator, high 32 bits carry
// the payload. Unrecognized kinds must decode without crashing.
pub const KIND_INT: u32 = 0;
pub const KIND_ADDRESS: u32 = 1;
pub const KIND_BOOL: u32 = 2;
pub const KIND_BYTE: u32 = 3;
pub const KIND_HANDLE: u32 = 4;

/// A typed boundary argument. Packs to the 64-bit tagged word the guest
/// sees; the wire packing lives here and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    Int(i32),
    Address(u32),
    Bool(bool),
    Byte(u8),
    Handle(Handle),
}

impl Arg {
    pub fn pack(self) -> u64 {
        let (kind, payload) = match self {
            Arg::Int(value) => (KIND_INT, value as u32),
            Arg::Address(addr) => (KIND_ADDRESS, addr),
            Arg::Bool(value) => (KIND_BOOL, value as u32),
            Arg::Byte(value) => (KIND_BYTE, value as u32),
            Arg::Handle(handle) => (KIND_HANDLE, handle.as_u32()),
        };
        ((payload as u64) << 32) | kind as u64
    }

    pub fn pack_i64(self) -> i64 {
        self.pack() as i64
    }
}

/// Result of decoding a tagged word. `Unknown` preserves the payload so the
/// debug channel can still display a value for tags it does not recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Int(i32),
    Address(u32),
    Bool(bool),
    Byte(u8),
    Handle(Handle),
    Unknown { kind: u32, payload: u32 },
}

pub fn decode(word: u64) -> Decoded {
    let kind = word as u32;
    let payload = (word >> 32) as u32;
    match kind {
        KIND_INT => Decoded::Int(payload as i32),
        KIND_ADDRESS => Decoded::Address(payload),
        KIND_BOOL => Decoded::Bool(payload != 0),
        KIND_BYTE => Decoded::Byte(payload as u8),
        KIND_HANDLE => Decoded::Handle(Handle::from_u32(payload)),
        other => Decoded::Unknown {
            kind: other,
            payload,
        },
    }
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Int(value) => write!(f, "int {value}"),
            Decoded::Address(addr) => write!(f, "address 0x{addr:x}"),
            Decoded::Bool(value) => write!(f, "bool {value}"),
            Decoded::Byte(value) => write!(f, "byte {value}"),
            Decoded::Handle(handle) => write!(f, "handle {}", handle.as_u32()),
            Decoded::Unknown { kind, payload } => write!(f, "<tag {kind}> {payload}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_kind_in_low_bits_and_payload_high() {
        let word = Arg::Int(42).pack();
        assert_eq!(word as u32, KIND_INT);
        assert_eq!((word >> 32) as u32, 42);

        let word = Arg::Address(0x10).pack();
        assert_eq!(word as u32, KIND_ADDRESS);
        assert_eq!((word >> 32) as u32, 0x10);
    }

    #[test]
    fn decode_roundtrips_every_kind() {
        assert_eq!(decode(Arg::Int(-7).pack()), Decoded::Int(-7));
        assert_eq!(decode(Arg::Address(64).pack()), Decoded::Address(64));
        assert_eq!(decode(Arg::Bool(true).pack()), Decoded::Bool(true));
        assert_eq!(decode(Arg::Byte(200).pack()), Decoded::Byte(200));
        assert_eq!(
            decode(Arg::Handle(Handle::from_u32(3)).pack()),
            Decoded::Handle(Handle::from_u32(3))
        );
    }

    #[test]
    fn tag_zero_is_a_plain_integer() {
        let word = (123u64 << 32) | 0;
        assert_eq!(decode(word), Decoded::Int(123));
    }

    #[test]
    fn unrecognized_tag_still_extracts_payload() {
        let word = (123u64 << 32) | 9;
        assert_eq!(
            decode(word),
            Decoded::Unknown {
                kind: 9,
                payload: 123
            }
        );
        assert_eq!(format!("{}", decode(word)), "<tag 9> 123");
    }
}
