use crate::dispatch;
use crate::memory;
use crate::registry;
use crate::wasi;
use std::collections::VecDeque;
use trestle_core::error::{
    bridge_error, parse_trap_message, BridgeError, INSTANTIATION, MEMORY_RANGE, MISSING_EXPORT,
    MODULE_COMPILE, RUNTIME_TRAP,
};
use trestle_core::{Arg, ClosureRef, Handle, HandleTable, HostObject};
use trestle_host::{Host, LoadOutcome};
use wasmtime::{Engine, Instance, Linker, Memory, Module, Store, Val};

/// A queued completion waiting for the guest stack to be empty. Host
/// functions only ever queue; nothing re-enters the guest from inside a
/// host call.
#[derive(Debug)]
pub(crate) enum Pending {
    FetchDone { closure: ClosureRef, body: String },
    FetchFailed { closure: ClosureRef, reason: String },
    ImageEvent { image: Handle, outcome: LoadOutcome },
}

/// A recurring callback on the virtual clock. There is no cancellation;
/// intervals run until the bridge is dropped.
#[derive(Debug)]
pub(crate) struct Interval {
    pub(crate) closure: ClosureRef,
    pub(crate) period_ms: u64,
    pub(crate) next_due_ms: u64,
}

/// Store data shared by every host function: the handle table, the host
/// capability, the completion queue, and the virtual clock.
pub struct BridgeState<H> {
    pub(crate) handles: HandleTable,
    pub(crate) host: H,
    pub(crate) queue: VecDeque<Pending>,
    pub(crate) intervals: Vec<Interval>,
    pub(crate) clock_ms: u64,
    pub(crate) in_guest: bool,
}

impl<H> BridgeState<H> {
    fn new(host: H) -> Self {
        Self {
            handles: HandleTable::new(),
            host,
            queue: VecDeque::new(),
            intervals: Vec::new(),
            clock_ms: 0,
            in_guest: false,
        }
    }
}

/// The bridge runtime: owns the guest instance, wires the host function
/// registry into its import table, and drives the event loop that re-enters
/// the guest from asynchronous completions.
pub struct Bridge<H: Host + 'static> {
    store: Store<BridgeState<H>>,
    instance: Instance,
}

impl<H: Host + 'static> Bridge<H> {
    /// Instantiates a guest module (binary wasm or WAT text) against `host`.
    pub fn new(host: H, module_bytes: impl AsRef<[u8]>) -> Result<Self, BridgeError> {
        let engine = Engine::default();
        let module = Module::new(&engine, module_bytes)
            .map_err(|err| bridge_error(MODULE_COMPILE, format!("module compile error: {err}")))?;
        let mut store = Store::new(&engine, BridgeState::new(host));
        let mut linker = Linker::new(&engine);
        registry::register(&mut linker)
            .map_err(|err| bridge_error(INSTANTIATION, format!("link error: {err}")))?;
        wasi::register(&mut linker)
            .map_err(|err| bridge_error(INSTANTIATION, format!("link error: {err}")))?;
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|err| map_trap(err, INSTANTIATION, "instantiation error"))?;
        Ok(Self { store, instance })
    }

    /// Runs the guest entry point once.
    pub fn run_main(&mut self) -> Result<(), BridgeError> {
        let func = self
            .instance
            .get_typed_func::<(), ()>(&mut self.store, "main")
            .map_err(|err| {
                bridge_error(MISSING_EXPORT, format!("guest export 'main' not found: {err}"))
            })?;
        self.store.data_mut().in_guest = true;
        let outcome = func.call(&mut self.store, ());
        self.store.data_mut().in_guest = false;
        outcome.map_err(|err| map_trap(err, RUNTIME_TRAP, "guest main trapped"))?;
        self.pump()
    }

    /// Drains the completion queue, dispatching each callback with the guest
    /// stack empty. Completions queued by those callbacks are drained too.
    pub fn pump(&mut self) -> Result<(), BridgeError> {
        while let Some(pending) = self.store.data_mut().queue.pop_front() {
            match pending {
                Pending::FetchDone { closure, body } => {
                    let handle = self.store.data_mut().handles.insert(HostObject::Text(body));
                    tracing::trace!(handle = handle.as_u32(), "fetch completion");
                    self.dispatch(&closure, &[Arg::Handle(handle)])?;
                }
                Pending::FetchFailed { closure, reason } => {
                    let handle = self
                        .store
                        .data_mut()
                        .handles
                        .insert(HostObject::Text(reason));
                    self.dispatch(&closure, &[Arg::Handle(handle)])?;
                }
                Pending::ImageEvent { image, outcome } => {
                    // The callback registered *now* wins, so guests may set
                    // src before or after registering onload/onerror.
                    let slot = self.store.data().handles.image(image)?;
                    let callback = match &outcome {
                        LoadOutcome::Loaded => slot.onload.clone(),
                        LoadOutcome::Failed(reason) => {
                            tracing::debug!(reason, "image load failed");
                            slot.onerror.clone()
                        }
                    };
                    if let Some(callback) = callback {
                        let mut args = vec![Arg::Handle(image)];
                        args.extend(callback.extras.iter().copied().map(Arg::Handle));
                        self.dispatch(&callback.closure, &args)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Advances the virtual clock by `ms`, firing due interval callbacks in
    /// chronological order (ties broken by registration order) and pumping
    /// queued completions between fires.
    pub fn advance(&mut self, ms: u64) -> Result<(), BridgeError> {
        self.pump()?;
        let target = self.store.data().clock_ms + ms;
        loop {
            let due = {
                let state = self.store.data();
                state
                    .intervals
                    .iter()
                    .enumerate()
                    .filter(|(_, interval)| interval.next_due_ms <= target)
                    .min_by_key(|(idx, interval)| (interval.next_due_ms, *idx))
                    .map(|(idx, interval)| (idx, interval.next_due_ms, interval.closure.clone()))
            };
            let Some((idx, due_ms, closure)) = due else {
                break;
            };
            {
                let state = self.store.data_mut();
                state.clock_ms = due_ms;
                let interval = &mut state.intervals[idx];
                interval.next_due_ms = due_ms + interval.period_ms;
            }
            self.dispatch(&closure, &[])?;
            self.pump()?;
        }
        self.store.data_mut().clock_ms = target;
        Ok(())
    }

    /// Invokes a guest callback with the given tagged arguments.
    pub fn dispatch(&mut self, closure: &ClosureRef, args: &[Arg]) -> Result<(), BridgeError> {
        dispatch::dispatch(&mut self.store, &self.instance, closure, args)
    }

    pub fn now_ms(&self) -> u64 {
        self.store.data().clock_ms
    }

    pub fn handles(&self) -> &HandleTable {
        &self.store.data().handles
    }

    pub fn handles_mut(&mut self) -> &mut HandleTable {
        &mut self.store.data_mut().handles
    }

    pub fn host(&self) -> &H {
        &self.store.data().host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.store.data_mut().host
    }

    /// Reads the string a StringRef at `ref_addr` points at.
    pub fn read_guest_string(&mut self, ref_addr: u32) -> Result<String, BridgeError> {
        let memory = self.memory()?;
        memory::read_string(&memory, &self.store, ref_addr)
            .map_err(|err| map_trap(err, MEMORY_RANGE, "guest string read"))
    }

    /// Copies `value` into a guest buffer of `capacity` bytes at `address`,
    /// silently truncating when the guest under-allocated.
    pub fn write_guest_string(
        &mut self,
        value: &str,
        address: u32,
        capacity: u32,
    ) -> Result<(), BridgeError> {
        let memory = self.memory()?;
        memory::write_capped(&memory, &mut self.store, address, capacity, value.as_bytes())
            .map_err(|err| map_trap(err, MEMORY_RANGE, "guest string write"))
    }

    pub fn read_memory(&mut self, addr: u32, len: u32) -> Result<Vec<u8>, BridgeError> {
        let memory = self.memory()?;
        memory::read_bytes(&memory, &self.store, addr, len)
            .map_err(|err| map_trap(err, MEMORY_RANGE, "guest memory read"))
    }

    pub fn write_memory(&mut self, addr: u32, bytes: &[u8]) -> Result<(), BridgeError> {
        let memory = self.memory()?;
        memory::write_bytes(&memory, &mut self.store, addr, bytes)
            .map_err(|err| map_trap(err, MEMORY_RANGE, "guest memory write"))
    }

    /// Reads an exported guest global as an i64 (i32 globals are widened).
    /// Returns `None` when the export is absent or not an integer global.
    pub fn global_i64(&mut self, name: &str) -> Option<i64> {
        let global = self.instance.get_global(&mut self.store, name)?;
        match global.get(&mut self.store) {
            Val::I64(value) => Some(value),
            Val::I32(value) => Some(value as i64),
            _ => None,
        }
    }

    fn memory(&mut self) -> Result<Memory, BridgeError> {
        self.instance
            .get_memory(&mut self.store, "memory")
            .ok_or_else(|| bridge_error(INSTANTIATION, "guest has no memory export"))
    }
}

/// Maps a wasmtime-level error back to a [`BridgeError`]. Host functions
/// raise fatal conditions through `anyhow` with a `bridge_trap:` marker;
/// the original code is recovered from the error chain. Anything else is a
/// plain guest trap.
pub(crate) fn map_trap(
    err: anyhow::Error,
    default_code: &'static str,
    default_message: &str,
) -> BridgeError {
    for cause in err.chain() {
        if let Some((code, message)) = parse_trap_message(&cause.to_string()) {
            return BridgeError { code, message };
        }
    }
    if let Some(trap) = err.downcast_ref::<wasmtime::Trap>() {
        return bridge_error(RUNTIME_TRAP, format!("{default_message}: {trap}"));
    }
    bridge_error(default_code, format!("{default_message}: {err}"))
}
