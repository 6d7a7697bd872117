use crate::bridge::{BridgeState, Interval, Pending};
use crate::memory::{guest_memory, read_string, write_capped};
use anyhow::anyhow;
use trestle_core::error::{trap_message, BridgeError, ABORT, BAD_CLOSURE_WORD};
use trestle_core::{decode, Callback, ClosureRef, Decoded, Handle, HostObject, ImageObject};
use trestle_host::{DrawOp, ElementKind, FetchOutcome, Host};
use wasmtime::{Caller, Linker, Memory};

/// Converts a table/typed-slot failure into a fatal trap for the in-flight
/// host call.
fn fatal(err: BridgeError) -> anyhow::Error {
    anyhow!(trap_message(err.code, err.message))
}

/// Decodes a closure reference word supplied by the guest. Kind `address`
/// names an export through a StringRef (read now, at registration time);
/// kind `int32` is a numeric closure-table index.
fn closure_from_word<T>(
    memory: &Memory,
    caller: &Caller<'_, T>,
    word: i64,
) -> anyhow::Result<ClosureRef> {
    match decode(word as u64) {
        Decoded::Address(ref_addr) => {
            let name = read_string(memory, caller, ref_addr)?;
            Ok(ClosureRef::Export(name))
        }
        Decoded::Int(idx) if idx >= 0 => Ok(ClosureRef::Indexed(idx as u32)),
        other => Err(anyhow!(trap_message(
            BAD_CLOSURE_WORD,
            format!("cannot use {other} as a closure reference")
        ))),
    }
}

fn draw_to<H: Host>(
    caller: &mut Caller<'_, BridgeState<H>>,
    ctx: i32,
    op: DrawOp,
) -> anyhow::Result<()> {
    let state = caller.data_mut();
    let element = state
        .handles
        .context_element(Handle::from_i32(ctx))
        .map_err(fatal)?
        .to_string();
    state.host.draw(&element, op);
    Ok(())
}

fn image_src<H: Host>(
    caller: &mut Caller<'_, BridgeState<H>>,
    img: i32,
) -> anyhow::Result<Option<String>> {
    let state = caller.data_mut();
    Ok(state
        .handles
        .image(Handle::from_i32(img))
        .map_err(fatal)?
        .src
        .clone())
}

/// Registers the `env` and `js` import surfaces. Every function re-acquires
/// the memory export before touching guest memory and goes through the
/// typed handle accessors; asynchronous completions are queued, never
/// dispatched inline.
pub(crate) fn register<H: Host + 'static>(
    linker: &mut Linker<BridgeState<H>>,
) -> anyhow::Result<()> {
    linker.func_wrap(
        "env",
        "debug",
        |mut caller: Caller<'_, BridgeState<H>>, word: i64| {
            let decoded = decode(word as u64);
            tracing::debug!(%decoded, "guest debug");
            caller.data_mut().host.debug_log(&format!("debug: {decoded}"));
        },
    )?;
    linker.func_wrap(
        "env",
        "abort",
        |_caller: Caller<'_, BridgeState<H>>| -> anyhow::Result<()> {
            Err(anyhow!(trap_message(ABORT, "abort called")))
        },
    )?;

    linker.func_wrap(
        "js",
        "console_log",
        |mut caller: Caller<'_, BridgeState<H>>, ref_addr: i32| -> anyhow::Result<()> {
            let memory = guest_memory(&mut caller)?;
            let text = read_string(&memory, &caller, ref_addr as u32)?;
            caller.data_mut().host.console_log(&text);
            Ok(())
        },
    )?;

    linker.func_wrap("js", "window", |mut caller: Caller<'_, BridgeState<H>>| {
        caller.data_mut().handles.insert(HostObject::Window).as_i32()
    })?;
    linker.func_wrap(
        "js",
        "window_document",
        |mut caller: Caller<'_, BridgeState<H>>| {
            caller
                .data_mut()
                .handles
                .insert(HostObject::Document)
                .as_i32()
        },
    )?;

    linker.func_wrap(
        "js",
        "document_get_element_by_id",
        |mut caller: Caller<'_, BridgeState<H>>, doc: i32, id_ref: i32| -> anyhow::Result<i32> {
            let memory = guest_memory(&mut caller)?;
            let id = read_string(&memory, &caller, id_ref as u32)?;
            let state = caller.data_mut();
            state
                .handles
                .document(Handle::from_i32(doc))
                .map_err(fatal)?;
            let object = match state.host.get_element(&id) {
                Some(_) => HostObject::Element { id },
                None => HostObject::Null,
            };
            Ok(state.handles.insert(object).as_i32())
        },
    )?;

    linker.func_wrap(
        "js",
        "canvas_get_context",
        |mut caller: Caller<'_, BridgeState<H>>, elem: i32, type_ref: i32| -> anyhow::Result<i32> {
            let memory = guest_memory(&mut caller)?;
            let context_type = read_string(&memory, &caller, type_ref as u32)?;
            let state = caller.data_mut();
            let element = state
                .handles
                .element_id(Handle::from_i32(elem))
                .map_err(fatal)?
                .to_string();
            let object = if context_type == "2d"
                && state.host.get_element(&element) == Some(ElementKind::Canvas)
            {
                HostObject::Context2d { element }
            } else {
                HostObject::Null
            };
            Ok(state.handles.insert(object).as_i32())
        },
    )?;

    linker.func_wrap(
        "js",
        "context_begin_path",
        |mut caller: Caller<'_, BridgeState<H>>, ctx: i32| draw_to(&mut caller, ctx, DrawOp::BeginPath),
    )?;
    linker.func_wrap(
        "js",
        "context_close_path",
        |mut caller: Caller<'_, BridgeState<H>>, ctx: i32| draw_to(&mut caller, ctx, DrawOp::ClosePath),
    )?;
    linker.func_wrap(
        "js",
        "context_stroke",
        |mut caller: Caller<'_, BridgeState<H>>, ctx: i32| draw_to(&mut caller, ctx, DrawOp::Stroke),
    )?;
    linker.func_wrap(
        "js",
        "context_fill",
        |mut caller: Caller<'_, BridgeState<H>>, ctx: i32| draw_to(&mut caller, ctx, DrawOp::Fill),
    )?;
    linker.func_wrap(
        "js",
        "context_move_to",
        |mut caller: Caller<'_, BridgeState<H>>, ctx: i32, x: f64, y: f64| {
            draw_to(&mut caller, ctx, DrawOp::MoveTo { x, y })
        },
    )?;
    linker.func_wrap(
        "js",
        "context_line_to",
        |mut caller: Caller<'_, BridgeState<H>>, ctx: i32, x: f64, y: f64| {
            draw_to(&mut caller, ctx, DrawOp::LineTo { x, y })
        },
    )?;
    linker.func_wrap(
        "js",
        "context_set_fill_style",
        |mut caller: Caller<'_, BridgeState<H>>, ctx: i32, style_ref: i32| -> anyhow::Result<()> {
            let memory = guest_memory(&mut caller)?;
            let style = read_string(&memory, &caller, style_ref as u32)?;
            draw_to(&mut caller, ctx, DrawOp::SetFillStyle { style })
        },
    )?;
    linker.func_wrap(
        "js",
        "context_clear_rect",
        |mut caller: Caller<'_, BridgeState<H>>, ctx: i32, x: f64, y: f64, w: f64, h: f64| {
            draw_to(&mut caller, ctx, DrawOp::ClearRect { x, y, w, h })
        },
    )?;
    linker.func_wrap(
        "js",
        "context_draw_image",
        |mut caller: Caller<'_, BridgeState<H>>, ctx: i32, img: i32, dx: f64, dy: f64| -> anyhow::Result<()> {
            let src = image_src(&mut caller, img)?;
            draw_to(&mut caller, ctx, DrawOp::DrawImage { src, dx, dy })
        },
    )?;
    linker.func_wrap(
        "js",
        "context_draw_image_rect",
        |mut caller: Caller<'_, BridgeState<H>>,
         ctx: i32,
         img: i32,
         sx: f64,
         sy: f64,
         sw: f64,
         sh: f64,
         dx: f64,
         dy: f64,
         dw: f64,
         dh: f64|
         -> anyhow::Result<()> {
            let src = image_src(&mut caller, img)?;
            draw_to(
                &mut caller,
                ctx,
                DrawOp::DrawImageRect {
                    src,
                    sx,
                    sy,
                    sw,
                    sh,
                    dx,
                    dy,
                    dw,
                    dh,
                },
            )
        },
    )?;

    linker.func_wrap("js", "image_new", |mut caller: Caller<'_, BridgeState<H>>| {
        caller
            .data_mut()
            .handles
            .insert(HostObject::Image(ImageObject::default()))
            .as_i32()
    })?;
    linker.func_wrap(
        "js",
        "image_set_src",
        |mut caller: Caller<'_, BridgeState<H>>, img: i32, url_ref: i32| -> anyhow::Result<()> {
            let memory = guest_memory(&mut caller)?;
            let url = read_string(&memory, &caller, url_ref as u32)?;
            let image = Handle::from_i32(img);
            let state = caller.data_mut();
            state.handles.image_mut(image).map_err(fatal)?.src = Some(url.clone());
            let outcome = state.host.load_image(&url);
            tracing::trace!(url, ?outcome, "image load queued");
            state.queue.push_back(Pending::ImageEvent { image, outcome });
            Ok(())
        },
    )?;
    linker.func_wrap(
        "js",
        "image_set_onload",
        |mut caller: Caller<'_, BridgeState<H>>, img: i32, word: i64| -> anyhow::Result<()> {
            register_image_callback(&mut caller, img, word, &[], true)
        },
    )?;
    linker.func_wrap(
        "js",
        "image_set_onload_with",
        |mut caller: Caller<'_, BridgeState<H>>, img: i32, word: i64, ctx: i32| -> anyhow::Result<()> {
            register_image_callback(&mut caller, img, word, &[ctx], true)
        },
    )?;
    linker.func_wrap(
        "js",
        "image_set_onload_with2",
        |mut caller: Caller<'_, BridgeState<H>>,
         img: i32,
         word: i64,
         ctx_a: i32,
         ctx_b: i32|
         -> anyhow::Result<()> {
            register_image_callback(&mut caller, img, word, &[ctx_a, ctx_b], true)
        },
    )?;
    linker.func_wrap(
        "js",
        "image_set_onerror",
        |mut caller: Caller<'_, BridgeState<H>>, img: i32, word: i64| -> anyhow::Result<()> {
            register_image_callback(&mut caller, img, word, &[], false)
        },
    )?;
    linker.func_wrap(
        "js",
        "image_set_onerror_with",
        |mut caller: Caller<'_, BridgeState<H>>, img: i32, word: i64, ctx: i32| -> anyhow::Result<()> {
            register_image_callback(&mut caller, img, word, &[ctx], false)
        },
    )?;

    linker.func_wrap(
        "js",
        "math_random_minmax",
        |mut caller: Caller<'_, BridgeState<H>>, min: i32, max: i32| -> i32 {
            let (min, max) = if min <= max { (min, max) } else { (max, min) };
            caller.data_mut().host.random_range(min, max)
        },
    )?;

    linker.func_wrap(
        "js",
        "fetch",
        |mut caller: Caller<'_, BridgeState<H>>, url_ref: i32, word: i64| -> anyhow::Result<()> {
            let memory = guest_memory(&mut caller)?;
            let url = read_string(&memory, &caller, url_ref as u32)?;
            let closure = closure_from_word(&memory, &caller, word)?;
            let state = caller.data_mut();
            match state.host.fetch(&url) {
                FetchOutcome::Success(body) => {
                    state.queue.push_back(Pending::FetchDone { closure, body });
                }
                FetchOutcome::Failure(reason) => {
                    // Compatibility path: the callback is never invoked and
                    // the guest gets no signal.
                    tracing::debug!(url, reason, "fetch failed; dropping callback");
                }
            }
            Ok(())
        },
    )?;
    linker.func_wrap(
        "js",
        "fetch_with_error",
        |mut caller: Caller<'_, BridgeState<H>>,
         url_ref: i32,
         ok_word: i64,
         err_word: i64|
         -> anyhow::Result<()> {
            let memory = guest_memory(&mut caller)?;
            let url = read_string(&memory, &caller, url_ref as u32)?;
            let ok_closure = closure_from_word(&memory, &caller, ok_word)?;
            let err_closure = closure_from_word(&memory, &caller, err_word)?;
            let state = caller.data_mut();
            match state.host.fetch(&url) {
                FetchOutcome::Success(body) => {
                    state.queue.push_back(Pending::FetchDone {
                        closure: ok_closure,
                        body,
                    });
                }
                FetchOutcome::Failure(reason) => {
                    state.queue.push_back(Pending::FetchFailed {
                        closure: err_closure,
                        reason,
                    });
                }
            }
            Ok(())
        },
    )?;

    linker.func_wrap(
        "js",
        "jsvalue_string_length",
        |mut caller: Caller<'_, BridgeState<H>>, handle: i32| -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let text = state.handles.text(Handle::from_i32(handle)).map_err(fatal)?;
            Ok(text.len() as i32)
        },
    )?;
    linker.func_wrap(
        "js",
        "jsvalue_string_set",
        |mut caller: Caller<'_, BridgeState<H>>,
         handle: i32,
         addr: i32,
         capacity: i32|
         -> anyhow::Result<()> {
            let text = {
                let state = caller.data_mut();
                state
                    .handles
                    .text(Handle::from_i32(handle))
                    .map_err(fatal)?
                    .to_string()
            };
            let memory = guest_memory(&mut caller)?;
            write_capped(
                &memory,
                &mut caller,
                addr as u32,
                capacity as u32,
                text.as_bytes(),
            )
        },
    )?;

    linker.func_wrap(
        "js",
        "set_interval_callback_with_timeout",
        |mut caller: Caller<'_, BridgeState<H>>, word: i64, timeout: i32| -> anyhow::Result<()> {
            let memory = guest_memory(&mut caller)?;
            let closure = closure_from_word(&memory, &caller, word)?;
            let period_ms = timeout.max(1) as u64;
            let state = caller.data_mut();
            let next_due_ms = state.clock_ms + period_ms;
            tracing::trace!(?closure, period_ms, "interval registered");
            state.intervals.push(Interval {
                closure,
                period_ms,
                next_due_ms,
            });
            Ok(())
        },
    )?;

    Ok(())
}

fn register_image_callback<H: Host>(
    caller: &mut Caller<'_, BridgeState<H>>,
    img: i32,
    word: i64,
    extras: &[i32],
    onload: bool,
) -> anyhow::Result<()> {
    let memory = guest_memory(caller)?;
    let closure = closure_from_word(&memory, caller, word)?;
    let state = caller.data_mut();
    let mut handles = Vec::with_capacity(extras.len());
    for raw in extras {
        let handle = Handle::from_i32(*raw);
        state.handles.get(handle).map_err(fatal)?;
        handles.push(handle);
    }
    let image = state.handles.image_mut(Handle::from_i32(img)).map_err(fatal)?;
    let callback = Callback::with_extras(closure, handles);
    // A new registration replaces any previous callback.
    if onload {
        image.onload = Some(callback);
    } else {
        image.onerror = Some(callback);
    }
    Ok(())
}
