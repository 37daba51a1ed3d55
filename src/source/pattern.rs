//! File name patterns
//!
//! Shell-style globs (`*`, `?`, `[abc]`, `[!abc]`, `[a-z]`) matched against a
//! file's name, not its full path. Compiled once into a `Regex`.

use crate::source::error::{SourceError, SourceResult};
use regex::Regex;

/// Compiled file name glob
#[derive(Debug, Clone)]
pub struct FilePattern {
    glob: String,
    regex: Regex,
}

impl FilePattern {
    pub fn new(glob: &str) -> SourceResult<Self> {
        let invalid = |reason: String| SourceError::InvalidPattern {
            pattern: glob.to_string(),
            reason,
        };

        let source = glob_to_regex(glob).map_err(invalid)?;
        let regex = Regex::new(&source).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }
}

impl std::fmt::Display for FilePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.glob)
    }
}

fn glob_to_regex(glob: &str) -> Result<String, String> {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }
                // A leading ']' is a literal member
                if chars.peek() == Some(&']') {
                    chars.next();
                    out.push_str("\\]");
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' | '[' | '&' | '~' | '^' => {
                            out.push('\\');
                            out.push(c);
                        }
                        _ => out.push(c),
                    }
                }
                if !closed {
                    return Err("unclosed character class".to_string());
                }
                out.push(']');
            }
            _ => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
    }

    out.push('$');
    Ok(out)
}
