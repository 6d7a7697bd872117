use crate::bridge::{map_trap, BridgeState};
use trestle_core::error::{
    bridge_error, BridgeError, CALLBACK_ARITY, GUEST_REENTRY, MISSING_EXPORT, RUNTIME_TRAP,
};
use trestle_core::{Arg, ClosureRef, DISPATCH_EXPORT};
use trestle_host::Host;
use wasmtime::{Instance, Store, Val, ValType};

/// Invokes a guest callback. Export-addressed closures are resolved against
/// the export table at call time; index-addressed closures go through the
/// fixed [`DISPATCH_EXPORT`] entry point with the closure reference packed
/// as the first tagged word.
pub(crate) fn dispatch<H: Host + 'static>(
    store: &mut Store<BridgeState<H>>,
    instance: &Instance,
    closure: &ClosureRef,
    args: &[Arg],
) -> Result<(), BridgeError> {
    if store.data().in_guest {
        return Err(bridge_error(
            GUEST_REENTRY,
            "cannot dispatch while a guest call is in progress",
        ));
    }
    let (name, words) = match closure {
        ClosureRef::Export(name) => {
            let words: Vec<Val> = args.iter().map(|arg| Val::I64(arg.pack_i64())).collect();
            (name.as_str(), words)
        }
        ClosureRef::Indexed(idx) => {
            let mut words = vec![Val::I64(Arg::Int(*idx as i32).pack_i64())];
            words.extend(args.iter().map(|arg| Val::I64(arg.pack_i64())));
            (DISPATCH_EXPORT, words)
        }
    };
    let func = instance.get_func(&mut *store, name).ok_or_else(|| {
        bridge_error(MISSING_EXPORT, format!("guest export '{name}' not found"))
    })?;

    // Each callback variant declares its tagged-word count; the callee must
    // accept exactly that many i64 params or the protocol is broken.
    let ty = func.ty(&*store);
    let params: Vec<ValType> = ty.params().collect();
    if params.len() != words.len() || params.iter().any(|param| !matches!(param, ValType::I64)) {
        return Err(bridge_error(
            CALLBACK_ARITY,
            format!(
                "callback '{name}' has {} params, dispatch passed {} tagged words",
                params.len(),
                words.len()
            ),
        ));
    }
    let mut results = vec![Val::I64(0); ty.results().len()];

    tracing::trace!(callback = name, args = words.len(), "dispatch");
    store.data_mut().in_guest = true;
    let outcome = func.call(&mut *store, &words, &mut results);
    store.data_mut().in_guest = false;
    outcome
        .map_err(|err| map_trap(err, RUNTIME_TRAP, &format!("callback '{name}' trapped")))
}
