//! Static capability scan, run over the raw action body before parsing.
//!
//! The scan does not depend on the snippet grammar, so hostile text in any
//! language (a Python `import os`, a shell `curl`) is rejected the same way.
//! String literals and `#` comments are skipped; every remaining identifier is
//! looked up in [`DENIED_IDENTIFIERS`].

use std::iter::Peekable;
use std::str::Chars;

/// Identifier classes the sandbox never admits.
///
/// Module loading, filesystem, network, process control, and reflection or
/// dynamic evaluation.
pub const DENIED_IDENTIFIERS: &[&str] = &[
    // module loading
    "import",
    "__import__",
    "importlib",
    "require",
    "include",
    "dlopen",
    "extern",
    // filesystem
    "open",
    "fopen",
    "read_file",
    "write_file",
    "fs",
    "shutil",
    "pathlib",
    "unlink",
    "rmdir",
    "mkdir",
    "chdir",
    // network
    "socket",
    "http",
    "https",
    "urllib",
    "requests",
    "fetch",
    "connect",
    "curl",
    "wget",
    // process and host
    "os",
    "sys",
    "subprocess",
    "system",
    "popen",
    "spawn",
    "exec",
    "execve",
    "fork",
    "kill",
    "signal",
    "threading",
    "multiprocessing",
    "resource",
    "Command",
    "getenv",
    "environ",
    "env",
    // reflection and dynamic evaluation
    "eval",
    "compile",
    "globals",
    "locals",
    "vars",
    "getattr",
    "setattr",
    "inspect",
    "gc",
    "__builtins__",
    "__class__",
    "__subclasses__",
];

/// A denied identifier found by the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityHit {
    pub identifier: String,
    pub line: usize,
}

impl std::fmt::Display for CapabilityHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: disallowed construct '{}'",
            self.line, self.identifier
        )
    }
}

/// Return the first denied identifier in `source`, if any.
pub fn scan_for_violation(source: &str) -> Option<CapabilityHit> {
    let mut chars = source.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '"' | '\'' => skip_literal(&mut chars, c, true),
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if ident == "r" {
                    if let Some(&quote @ ('"' | '\'')) = chars.peek() {
                        chars.next();
                        skip_literal(&mut chars, quote, false);
                        continue;
                    }
                }
                if DENIED_IDENTIFIERS.contains(&ident.as_str()) {
                    return Some(CapabilityHit {
                        identifier: ident,
                        line,
                    });
                }
            }
            _ => {}
        }
    }

    None
}

/// Skip to the closing quote. An unterminated literal ends at the newline so
/// the rest of the body is still scanned.
fn skip_literal(chars: &mut Peekable<Chars<'_>>, quote: char, escapes: bool) {
    let mut escaped = false;
    while let Some(&next) = chars.peek() {
        if next == '\n' {
            break;
        }
        chars.next();
        if escaped {
            escaped = false;
        } else if escapes && next == '\\' {
            escaped = true;
        } else if next == quote {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_import_is_flagged() {
        let hit = scan_for_violation("import re\nm = re.search('x', CONTEXT)").unwrap();
        assert_eq!(hit.identifier, "import");
        assert_eq!(hit.line, 1);
    }

    #[test]
    fn test_dunder_import_is_flagged_on_later_line() {
        let hit = scan_for_violation("let a = 1\nlet m = __import__('os')").unwrap();
        assert_eq!(hit.identifier, "__import__");
        assert_eq!(hit.line, 2);
    }

    #[test]
    fn test_denied_words_inside_strings_are_ignored() {
        assert!(scan_for_violation(r#"print count("import os")"#).is_none());
        assert!(scan_for_violation(r"print search('open(file)')").is_none());
    }

    #[test]
    fn test_comments_are_ignored() {
        assert!(scan_for_violation("# import os\nprint len(CONTEXT)").is_none());
    }

    #[test]
    fn test_identifier_prefix_is_not_a_match() {
        assert!(scan_for_violation("let opened = 1\nlet system_count = 2").is_none());
    }

    #[test]
    fn test_filesystem_and_network_calls_are_flagged() {
        assert_eq!(
            scan_for_violation("print open('/etc/passwd')")
                .unwrap()
                .identifier,
            "open"
        );
        assert_eq!(
            scan_for_violation("let r = fetch(\"http://x\")")
                .unwrap()
                .identifier,
            "fetch"
        );
    }

    #[test]
    fn test_raw_string_backslash_does_not_hide_code() {
        let hit = scan_for_violation(r#"print r"\" ; import os #""#).unwrap();
        assert_eq!(hit.identifier, "import");
        assert!(scan_for_violation(r#"print search(r"open\d")"#).is_none());
    }

    #[test]
    fn test_unterminated_string_does_not_hide_next_line() {
        let hit = scan_for_violation("print \"abc\nsubprocess").unwrap();
        assert_eq!(hit.identifier, "subprocess");
        assert_eq!(hit.line, 2);
    }
}
