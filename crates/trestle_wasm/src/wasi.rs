use crate::bridge::BridgeState;
use crate::memory::{guest_memory, read_string_ref, write_u32, write_u64};
use anyhow::anyhow;
use trestle_core::error::{trap_message, IOVEC_COUNT, UNSUPPORTED_FD};
use trestle_host::Host;
use wasmtime::{Caller, Linker};

const MODULE: &str = "wasi_snapshot_preview1";

/// Registers the `wasi_snapshot_preview1` subset. Only `fd_write` to stdout
/// and stderr does real work; the rest exists to satisfy linkers that emit
/// WASI imports unconditionally.
pub(crate) fn register<H: Host + 'static>(
    linker: &mut Linker<BridgeState<H>>,
) -> anyhow::Result<()> {
    linker.func_wrap(
        MODULE,
        "fd_write",
        |mut caller: Caller<'_, BridgeState<H>>,
         fd: i32,
         ciovs: i32,
         ciovs_len: i32,
         nwritten: i32|
         -> anyhow::Result<i32> {
            if ciovs_len != 1 {
                return Err(anyhow!(trap_message(
                    IOVEC_COUNT,
                    format!("fd_write expects exactly 1 iovec, got {ciovs_len}")
                )));
            }
            let memory = guest_memory(&mut caller)?;
            // A ciovec is laid out exactly like a StringRef: address then
            // length, both little-endian u32.
            let (addr, len) = read_string_ref(&memory, &caller, ciovs as u32)?;
            let bytes = crate::memory::read_bytes(&memory, &caller, addr, len)?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            match fd {
                1 => caller.data_mut().host.stdout_write(&text),
                2 => caller.data_mut().host.stderr_write(&text),
                other => {
                    return Err(anyhow!(trap_message(
                        UNSUPPORTED_FD,
                        format!("fd_write to fd {other} is not supported")
                    )))
                }
            }
            write_u32(&memory, &mut caller, nwritten as u32, len)?;
            Ok(0)
        },
    )?;

    // clock_time_get reports the bridge's virtual clock so guest-visible time
    // and interval firing stay on one timeline.
    linker.func_wrap(
        MODULE,
        "clock_time_get",
        |mut caller: Caller<'_, BridgeState<H>>,
         _clock_id: i32,
         _precision: i64,
         out: i32|
         -> anyhow::Result<i32> {
            let nanos = caller.data().clock_ms * 1_000_000;
            let memory = guest_memory(&mut caller)?;
            write_u64(&memory, &mut caller, out as u32, nanos)?;
            Ok(0)
        },
    )?;

    linker.func_wrap(
        MODULE,
        "environ_sizes_get",
        |mut caller: Caller<'_, BridgeState<H>>, count: i32, size: i32| -> anyhow::Result<i32> {
            let memory = guest_memory(&mut caller)?;
            write_u32(&memory, &mut caller, count as u32, 0)?;
            write_u32(&memory, &mut caller, size as u32, 0)?;
            Ok(0)
        },
    )?;
    linker.func_wrap(
        MODULE,
        "args_sizes_get",
        |mut caller: Caller<'_, BridgeState<H>>, count: i32, size: i32| -> anyhow::Result<i32> {
            let memory = guest_memory(&mut caller)?;
            write_u32(&memory, &mut caller, count as u32, 0)?;
            write_u32(&memory, &mut caller, size as u32, 0)?;
            Ok(0)
        },
    )?;

    linker.func_wrap(MODULE, "environ_get", |_: Caller<'_, BridgeState<H>>, _: i32, _: i32| 0i32)?;
    linker.func_wrap(MODULE, "args_get", |_: Caller<'_, BridgeState<H>>, _: i32, _: i32| 0i32)?;
    linker.func_wrap(
        MODULE,
        "fd_read",
        |_: Caller<'_, BridgeState<H>>, _: i32, _: i32, _: i32, _: i32| 0i32,
    )?;
    linker.func_wrap(
        MODULE,
        "fd_filestat_get",
        |_: Caller<'_, BridgeState<H>>, _: i32, _: i32| 0i32,
    )?;
    linker.func_wrap(MODULE, "fd_close", |_: Caller<'_, BridgeState<H>>, _: i32| 0i32)?;
    linker.func_wrap(
        MODULE,
        "path_open",
        |_: Caller<'_, BridgeState<H>>,
         _: i32,
         _: i32,
         _: i32,
         _: i32,
         _: i32,
         _: i64,
         _: i64,
         _: i32,
         _: i32| 0i32,
    )?;
    linker.func_wrap(MODULE, "proc_exit", |_: Caller<'_, BridgeState<H>>, _: i32| {})?;

    Ok(())
}
