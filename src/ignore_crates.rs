//! Crate-based ignore predicate.

use std::sync::OnceLock;

use panicpoint_internals::IgnoreLocation;

/// Ignores frames whose source file belongs to one of the listed crates.
///
/// The crate is recognized from the file path: the `std`, `core` and `alloc`
/// crates from the Rust source tree, every other crate from its Cargo registry
/// checkout. Frames of local crates are never matched.
///
/// ```
/// use panicpoint::{IgnoreCrates, IgnoreLocation};
///
/// let tokio = IgnoreCrates { crates: &["tokio"] };
/// assert!(tokio.should_ignore(
///     "tokio::runtime::task::harness::poll",
///     "   at /home/u/.cargo/registry/src/index.crates.io-1949cf8c6b5b557f/tokio-1.48.0/src/runtime/task/harness.rs:12:5",
/// ));
/// assert!(!tokio.should_ignore("app::main", "   at /srv/app/src/main.rs:3:5"));
/// ```
#[derive(Copy, Clone, Debug)]
pub struct IgnoreCrates {
    /// Crate names, as written in `Cargo.toml` (`-` and `_` are distinct).
    pub crates: &'static [&'static str],
}

impl IgnoreCrates {
    /// The crates of the standard library distribution.
    pub const STD: Self = Self {
        crates: &["std", "core", "alloc"],
    };

    /// The name of the crate `file_line` points into, if it can be told.
    pub fn crate_name(file_line: &str) -> Option<&str> {
        static REGEXES: OnceLock<[regex::Regex; 2]> = OnceLock::new();
        let [std_regex, registry_regex] = REGEXES.get_or_init(|| {
            [
                // - /lib/rustlib/src/rust/library/{std|core|alloc}/src/...
                // - /rustc/{40-char-hash}/library/{std|core|alloc}/src/...
                regex::Regex::new(
                    r"(?:/lib/rustlib/src/rust|^/rustc/[0-9a-f]{40})/library/(std|core|alloc)/src/.*$",
                )
                .expect("built-in regex pattern for std library paths should be valid"),
                // - /.cargo/registry/src/{index}-{16-char-hash}/{crate}-{version}/src/...
                regex::Regex::new(
                    r"/\.cargo/registry/src/[^/]+-[0-9a-f]{16}/([^./]+)-[0-9]+\.[^/]*/src/.*$",
                )
                .expect("built-in regex pattern for cargo registry paths should be valid"),
            ]
        });

        let path = file_line.trim();
        let path = path.strip_prefix("at ").unwrap_or(path);

        std_regex
            .captures(path)
            .or_else(|| registry_regex.captures(path))
            .and_then(|captures| captures.get(1))
            .map(|name| name.as_str())
    }
}

impl IgnoreLocation for IgnoreCrates {
    fn should_ignore(&self, _func_line: &str, file_line: &str) -> bool {
        Self::crate_name(file_line).is_some_and(|name| self.crates.contains(&name))
    }
}
