//! Frame parser.
//!
//! Turns one (function line, file line) pair of a stack dump into a
//! [`Location`]. Parsing is best effort and total: malformed text degrades to
//! a [`Location`] with `line == -1`, never to an error.

use alloc::{borrow::Cow, string::ToString};
use core::fmt;

/// A call site recovered from a stack dump.
///
/// The raw lines are kept verbatim next to the parsed fields so that
/// diagnostics can show exactly what the runtime printed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    /// The function line, verbatim.
    pub func_line: Cow<'static, str>,
    /// The file line, verbatim.
    pub file_line: Cow<'static, str>,
    /// The function name: the function line up to its first `(`.
    pub function: Cow<'static, str>,
    /// The source file path.
    pub file: Cow<'static, str>,
    /// The 1-based line number, or `-1` when it could not be parsed.
    pub line: i64,
    /// Position of the owning panic in its chain.
    ///
    /// `0` is the most recent panic, `1` the one before it, and so on. The
    /// sentinel [`Location::UNKNOWN`] has depth `-1`.
    pub depth: i32,
}

impl Location {
    /// Placeholder used when a dump contains no panic at all.
    pub const UNKNOWN: Self = Self {
        func_line: Cow::Borrowed("UNKNOWN:-1"),
        file_line: Cow::Borrowed("UNKNOWN"),
        function: Cow::Borrowed("UNKNOWN"),
        file: Cow::Borrowed("UNKNOWN"),
        line: -1,
        depth: -1,
    };

    /// Parses a frame pair.
    ///
    /// The function name is the text before the first `(` of `func_line` (or
    /// the whole line). The file line is trimmed, an optional leading `at ` is
    /// dropped, and it is split on its first `:`; the first token after it,
    /// delimited by whitespace or another `:`, is the line number.
    ///
    /// ```
    /// use panicpoint_internals::Location;
    ///
    /// let loc = Location::parse("orders::Book::best_bid", "        at /srv/orders/src/orders.rs:88:17", 0);
    /// assert_eq!(loc.function, "orders::Book::best_bid");
    /// assert_eq!(loc.file, "/srv/orders/src/orders.rs");
    /// assert_eq!(loc.line, 88);
    /// ```
    pub fn parse(func_line: &str, file_line: &str, depth: i32) -> Self {
        let function = match func_line.find('(') {
            Some(idx) if idx > 0 => &func_line[..idx],
            _ => func_line,
        };
        let (file, line) = split_file_line(file_line);

        Self {
            func_line: func_line.to_string().into(),
            file_line: file_line.to_string().into(),
            function: function.to_string().into(),
            file: file.to_string().into(),
            line,
            depth,
        }
    }

    /// Returns `true` for the [`Location::UNKNOWN`] sentinel.
    pub fn is_unknown(&self) -> bool {
        self.depth == -1 && self.function == "UNKNOWN"
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line >= 0 {
            write!(f, "{} ({}:{})", self.function, self.file, self.line)
        } else {
            write!(f, "{} ({})", self.function, self.file)
        }
    }
}

fn split_file_line(file_line: &str) -> (&str, i64) {
    let text = file_line.trim();
    let text = text.strip_prefix("at ").unwrap_or(text);

    let search_from = drive_prefix_len(text);
    let Some(idx) = text[search_from..].find(':') else {
        return (text, -1);
    };
    let idx = search_from + idx;

    let (file, rest) = (&text[..idx], &text[idx + 1..]);
    let token = rest
        .split(|c: char| c.is_whitespace() || c == ':')
        .next()
        .unwrap_or_default();
    (file, token.parse().unwrap_or(-1))
}

// `C:\src\main.rs:10:5` must split after the path, not after the drive letter.
fn drive_prefix_len(text: &str) -> usize {
    match text.as_bytes() {
        [letter, b':', b'\\' | b'/', ..] if letter.is_ascii_alphabetic() => 2,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rust_frame() {
        let loc = Location::parse(
            "orders::Book::best_bid",
            "             at /srv/orders/src/orders.rs:88:17",
            3,
        );
        assert_eq!(loc.function, "orders::Book::best_bid");
        assert_eq!(loc.file, "/srv/orders/src/orders.rs");
        assert_eq!(loc.line, 88);
        assert_eq!(loc.depth, 3);
        assert_eq!(loc.file_line, "             at /srv/orders/src/orders.rs:88:17");
    }

    #[test]
    fn test_parse_function_with_arguments() {
        let loc = Location::parse(
            "orders::handler(0x1, 0x2)",
            "\t/srv/orders/src/handler.rs:38 +0xf0",
            0,
        );
        assert_eq!(loc.function, "orders::handler");
        assert_eq!(loc.file, "/srv/orders/src/handler.rs");
        assert_eq!(loc.line, 38);
    }

    #[test]
    fn test_parse_marker_keeps_leading_paren_line() {
        let loc = Location::parse("(weird)", "x.rs:1", 0);
        assert_eq!(loc.function, "(weird)");
    }

    #[test]
    fn test_parse_degrades_without_line() {
        let loc = Location::parse("f", "        at <unknown>", 0);
        assert_eq!(loc.file, "<unknown>");
        assert_eq!(loc.line, -1);

        let loc = Location::parse("f", "src/lib.rs:abc", 0);
        assert_eq!(loc.file, "src/lib.rs");
        assert_eq!(loc.line, -1);

        let loc = Location::parse("", "", 0);
        assert_eq!(loc.function, "");
        assert_eq!(loc.file, "");
        assert_eq!(loc.line, -1);
    }

    #[test]
    fn test_parse_windows_drive() {
        let loc = Location::parse("app::run", r"   at C:\work\app\src\main.rs:12:9", 0);
        assert_eq!(loc.file, r"C:\work\app\src\main.rs");
        assert_eq!(loc.line, 12);
    }

    #[test]
    fn test_unknown() {
        assert!(Location::UNKNOWN.is_unknown());
        assert_eq!(Location::UNKNOWN.depth, -1);
        assert!(!Location::parse("UNKNOWN", "UNKNOWN", 0).is_unknown());
    }

    #[test]
    fn test_display() {
        let loc = Location::parse("app::run", "at src/main.rs:4:1", 0);
        assert_eq!(alloc::format!("{loc}"), "app::run (src/main.rs:4)");
        assert_eq!(alloc::format!("{}", Location::UNKNOWN), "UNKNOWN (UNKNOWN)");
    }
}
