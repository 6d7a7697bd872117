use crate::{DrawOp, ElementKind, FetchOutcome, Host, LoadOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Recording host for tests. Elements, fetch responses, and image outcomes
/// are scripted up front; everything the guest does is captured for
/// inspection afterwards. The RNG is seeded so runs are deterministic.
#[derive(Debug)]
pub struct SimHost {
    pub logs: Vec<String>,
    pub debug_lines: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub draws: HashMap<String, Vec<DrawOp>>,
    pub fetch_calls: Vec<String>,
    pub random_calls: Vec<(i32, i32)>,
    elements: HashMap<String, ElementKind>,
    fetch_responses: HashMap<String, FetchOutcome>,
    image_outcomes: HashMap<String, LoadOutcome>,
    rng: StdRng,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            logs: Vec::new(),
            debug_lines: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            draws: HashMap::new(),
            fetch_calls: Vec::new(),
            random_calls: Vec::new(),
            elements: HashMap::new(),
            fetch_responses: HashMap::new(),
            image_outcomes: HashMap::new(),
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_canvas(mut self, id: &str) -> Self {
        self.elements.insert(id.to_string(), ElementKind::Canvas);
        self
    }

    pub fn with_element(mut self, id: &str) -> Self {
        self.elements.insert(id.to_string(), ElementKind::Generic);
        self
    }

    pub fn with_fetch_response(mut self, url: &str, body: &str) -> Self {
        self.fetch_responses
            .insert(url.to_string(), FetchOutcome::Success(body.to_string()));
        self
    }

    pub fn with_fetch_failure(mut self, url: &str, reason: &str) -> Self {
        self.fetch_responses
            .insert(url.to_string(), FetchOutcome::Failure(reason.to_string()));
        self
    }

    pub fn with_image_failure(mut self, url: &str, reason: &str) -> Self {
        self.image_outcomes
            .insert(url.to_string(), LoadOutcome::Failed(reason.to_string()));
        self
    }

    pub fn draws_for(&self, element: &str) -> &[DrawOp] {
        self.draws.get(element).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Host for SimHost {
    fn console_log(&mut self, text: &str) {
        self.logs.push(text.to_string());
    }

    fn debug_log(&mut self, text: &str) {
        self.debug_lines.push(text.to_string());
    }

    fn stdout_write(&mut self, text: &str) {
        self.stdout.push_str(text);
    }

    fn stderr_write(&mut self, text: &str) {
        self.stderr.push_str(text);
    }

    fn get_element(&mut self, id: &str) -> Option<ElementKind> {
        self.elements.get(id).copied()
    }

    fn draw(&mut self, element: &str, op: DrawOp) {
        self.draws.entry(element.to_string()).or_default().push(op);
    }

    fn fetch(&mut self, url: &str) -> FetchOutcome {
        self.fetch_calls.push(url.to_string());
        self.fetch_responses
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchOutcome::Failure(format!("no scripted response for {url}")))
    }

    fn load_image(&mut self, url: &str) -> LoadOutcome {
        self.image_outcomes
            .get(url)
            .cloned()
            .unwrap_or(LoadOutcome::Loaded)
    }

    fn random_range(&mut self, min: i32, max: i32) -> i32 {
        self.random_calls.push((min, max));
        self.rng.gen_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_logs_and_draws() {
        let mut host = SimHost::new().with_canvas("game");
        host.console_log("hello");
        host.draw("game", DrawOp::BeginPath);
        host.draw(
            "game",
            DrawOp::MoveTo { x: 1.0, y: 2.0 },
        );
        assert_eq!(host.logs, vec!["hello"]);
        assert_eq!(host.draws_for("game").len(), 2);
        assert_eq!(host.draws_for("empty"), &[]);
    }

    #[test]
    fn unscripted_fetch_fails() {
        let mut host = SimHost::new().with_fetch_response("a", "body");
        assert_eq!(host.fetch("a"), FetchOutcome::Success("body".to_string()));
        assert!(matches!(host.fetch("b"), FetchOutcome::Failure(_)));
        assert_eq!(host.fetch_calls, vec!["a", "b"]);
    }

    #[test]
    fn random_is_deterministic_and_in_range() {
        let mut a = SimHost::new().with_seed(7);
        let mut b = SimHost::new().with_seed(7);
        for _ in 0..32 {
            let x = a.random_range(3, 9);
            assert_eq!(x, b.random_range(3, 9));
            assert!((3..=9).contains(&x));
        }
    }

    #[test]
    fn elements_are_scripted() {
        let mut host = SimHost::new().with_canvas("game").with_element("hud");
        assert_eq!(host.get_element("game"), Some(ElementKind::Canvas));
        assert_eq!(host.get_element("hud"), Some(ElementKind::Generic));
        assert_eq!(host.get_element("missing"), None);
    }
}
