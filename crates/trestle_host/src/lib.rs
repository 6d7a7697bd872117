//! Host capability surface for the Trestle bridge.
//!
//! Everything the guest can reach beyond its own linear memory goes through
//! the [`Host`] trait: console output, element lookup, draw commands, network
//! fetch, image loading, and randomness. The bridge never touches a concrete
//! host directly, so tests run against [`SimHost`] and the CLI runs against
//! [`ConsoleHost`] with no changes to the boundary code.

mod console;
mod sim;

pub use console::ConsoleHost;
pub use sim::SimHost;

/// One drawing command on a render surface. Commands are delivered to the
/// host in guest program order and carry everything the surface needs; the
/// host never sees a raw context object.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    BeginPath,
    ClosePath,
    Stroke,
    Fill,
    MoveTo {
        x: f64,
        y: f64,
    },
    LineTo {
        x: f64,
        y: f64,
    },
    SetFillStyle {
        style: String,
    },
    ClearRect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
    },
    DrawImage {
        src: Option<String>,
        dx: f64,
        dy: f64,
    },
    DrawImageRect {
        src: Option<String>,
        sx: f64,
        sy: f64,
        sw: f64,
        sh: f64,
        dx: f64,
        dy: f64,
        dw: f64,
        dh: f64,
    },
}

/// What an element lookup found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Canvas,
    Generic,
}

/// Outcome of a network fetch, resolved by the host when the guest issues
/// the request. The bridge queues the completion; it never re-enters the
/// guest from inside the host call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(String),
    Failure(String),
}

/// Outcome of an image load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Failed(String),
}

/// The capability interface the bridge calls into. One implementation talks
/// to a real environment, one records everything for tests.
pub trait Host {
    /// Guest `console_log` output.
    fn console_log(&mut self, text: &str);

    /// Decoded `debug` import output.
    fn debug_log(&mut self, text: &str);

    /// Byte stream of the guest's stdout (fd 1).
    fn stdout_write(&mut self, text: &str);

    /// Byte stream of the guest's stderr (fd 2).
    fn stderr_write(&mut self, text: &str);

    /// Element lookup by identifier. `None` when absent.
    fn get_element(&mut self, id: &str) -> Option<ElementKind>;

    /// Apply one draw command to the surface backing `element`.
    fn draw(&mut self, element: &str, op: DrawOp);

    /// Resolve a fetch of `url` to completion.
    fn fetch(&mut self, url: &str) -> FetchOutcome;

    /// Resolve an image load of `url` to completion.
    fn load_image(&mut self, url: &str) -> LoadOutcome;

    /// Uniform integer over the inclusive range. Callers guarantee
    /// `min <= max`.
    fn random_range(&mut self, min: i32, max: i32) -> i32;
}
