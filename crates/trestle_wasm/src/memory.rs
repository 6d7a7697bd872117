use anyhow::anyhow;
use trestle_core::error::{trap_message, INSTANTIATION, MEMORY_RANGE};
use wasmtime::{AsContext, AsContextMut, Caller, Extern, Memory};

// Views over guest memory are never cached: growth during a guest call
// reallocates the backing buffer, so every host function re-acquires the
// memory export before each access.

pub(crate) fn guest_memory<T>(caller: &mut Caller<'_, T>) -> anyhow::Result<Memory> {
    match caller.get_export("memory") {
        Some(Extern::Memory(memory)) => Ok(memory),
        _ => Err(anyhow!(trap_message(
            INSTANTIATION,
            "guest has no memory export"
        ))),
    }
}

pub(crate) fn read_bytes(
    memory: &Memory,
    store: impl AsContext,
    addr: u32,
    len: u32,
) -> anyhow::Result<Vec<u8>> {
    let data = memory.data(&store);
    let start = addr as usize;
    let end = start
        .checked_add(len as usize)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| range_error(addr, len, data.len()))?;
    Ok(data[start..end].to_vec())
}

pub(crate) fn read_u32(memory: &Memory, store: impl AsContext, addr: u32) -> anyhow::Result<u32> {
    let bytes = read_bytes(memory, store, addr, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Loads a StringRef: two little-endian u32 words (address, length).
pub(crate) fn read_string_ref(
    memory: &Memory,
    store: impl AsContext,
    ref_addr: u32,
) -> anyhow::Result<(u32, u32)> {
    let addr = read_u32(memory, &store, ref_addr)?;
    let len = read_u32(memory, &store, ref_addr.wrapping_add(4))?;
    Ok((addr, len))
}

/// Reads the string a StringRef points at. Out-of-range is fatal; malformed
/// UTF-8 is decoded with replacement semantics, never fatal.
pub(crate) fn read_string(
    memory: &Memory,
    store: impl AsContext,
    ref_addr: u32,
) -> anyhow::Result<String> {
    let (addr, len) = read_string_ref(memory, &store, ref_addr)?;
    let bytes = read_bytes(memory, &store, addr, len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub(crate) fn write_bytes(
    memory: &Memory,
    mut store: impl AsContextMut,
    addr: u32,
    bytes: &[u8],
) -> anyhow::Result<()> {
    let size = memory.data_size(&store);
    memory
        .write(&mut store, addr as usize, bytes)
        .map_err(|_| range_error(addr, bytes.len() as u32, size))
}

pub(crate) fn write_u32(
    memory: &Memory,
    store: impl AsContextMut,
    addr: u32,
    value: u32,
) -> anyhow::Result<()> {
    write_bytes(memory, store, addr, &value.to_le_bytes())
}

pub(crate) fn write_u64(
    memory: &Memory,
    store: impl AsContextMut,
    addr: u32,
    value: u64,
) -> anyhow::Result<()> {
    write_bytes(memory, store, addr, &value.to_le_bytes())
}

/// Copies `bytes` into a guest buffer of `capacity` bytes, silently
/// truncating when the buffer is smaller than the value. Callers are
/// expected to size the buffer from the value's byte length.
pub(crate) fn write_capped(
    memory: &Memory,
    store: impl AsContextMut,
    addr: u32,
    capacity: u32,
    bytes: &[u8],
) -> anyhow::Result<()> {
    let len = bytes.len().min(capacity as usize);
    write_bytes(memory, store, addr, &bytes[..len])
}

fn range_error(addr: u32, len: u32, size: usize) -> anyhow::Error {
    anyhow!(trap_message(
        MEMORY_RANGE,
        format!("range {addr}+{len} exceeds memory size {size}")
    ))
}
