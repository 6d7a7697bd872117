use crate::{DrawOp, ElementKind, FetchOutcome, Host, LoadOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Stand-alone host used by the CLI. Console output goes to the process
/// streams, draw commands are logged, and fetch/image URLs resolve against a
/// local root directory so guests can be exercised without a network.
pub struct ConsoleHost {
    root: Option<PathBuf>,
    elements: HashMap<String, ElementKind>,
    rng: StdRng,
}

impl Default for ConsoleHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self {
            root: None,
            elements: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Directory that fetch/image URLs are resolved under.
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = Some(root);
        self
    }

    pub fn with_canvas(mut self, id: &str) -> Self {
        self.elements.insert(id.to_string(), ElementKind::Canvas);
        self
    }

    fn resolve(&self, url: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        // Strip a scheme if present; the path part is what we serve.
        let path = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
        Some(root.join(path.trim_start_matches('/')))
    }
}

impl Host for ConsoleHost {
    fn console_log(&mut self, text: &str) {
        println!("{text}");
    }

    fn debug_log(&mut self, text: &str) {
        eprintln!("{text}");
    }

    fn stdout_write(&mut self, text: &str) {
        print!("{text}");
    }

    fn stderr_write(&mut self, text: &str) {
        eprint!("{text}");
    }

    fn get_element(&mut self, id: &str) -> Option<ElementKind> {
        self.elements.get(id).copied()
    }

    fn draw(&mut self, element: &str, op: DrawOp) {
        tracing::debug!(element, ?op, "draw");
    }

    fn fetch(&mut self, url: &str) -> FetchOutcome {
        let Some(path) = self.resolve(url) else {
            return FetchOutcome::Failure("no fetch root configured".to_string());
        };
        match fs::read_to_string(&path) {
            Ok(body) => FetchOutcome::Success(body),
            Err(err) => FetchOutcome::Failure(format!("{}: {err}", path.display())),
        }
    }

    fn load_image(&mut self, url: &str) -> LoadOutcome {
        match self.resolve(url) {
            Some(path) if path.exists() => LoadOutcome::Loaded,
            Some(path) => LoadOutcome::Failed(format!("{}: not found", path.display())),
            None => LoadOutcome::Failed("no fetch root configured".to_string()),
        }
    }

    fn random_range(&mut self, min: i32, max: i32) -> i32 {
        self.rng.gen_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_without_root_fails() {
        let mut host = ConsoleHost::new();
        assert!(matches!(host.fetch("data.txt"), FetchOutcome::Failure(_)));
        assert!(matches!(
            host.load_image("sprite.png"),
            LoadOutcome::Failed(_)
        ));
    }

    #[test]
    fn resolve_strips_scheme_and_leading_slash() {
        let host = ConsoleHost::new().with_root(PathBuf::from("/srv"));
        assert_eq!(
            host.resolve("https://example.test/assets/a.txt").unwrap(),
            PathBuf::from("/srv/example.test/assets/a.txt")
        );
        assert_eq!(
            host.resolve("/assets/a.txt").unwrap(),
            PathBuf::from("/srv/assets/a.txt")
        );
    }

    #[test]
    fn random_stays_in_range() {
        let mut host = ConsoleHost::new();
        for _ in 0..32 {
            let x = host.random_range(-2, 2);
            assert!((-2..=2).contains(&x));
        }
    }
}
