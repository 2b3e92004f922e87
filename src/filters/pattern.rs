//! Shell-style globs compiled into anchored regular expressions over whole paths.
//!
//! Unlike [`glob::Pattern`], a single `*` never crosses a path separator. Use `**` to match
//! across any number of path segments:
//!
//! | glob | matches |
//! |------|---------|
//! | `*`  | any run of characters except `/` |
//! | `**` | any run of characters, including `/` |
//! | `?`  | exactly one character |
//! | `[...]` | a bracket expression; `[!...]` negates, `a-z` is a range |
//!
//! Every compiled pattern also accepts a single trailing `/`, so `build` matches both the
//! file `build` and the directory `build/`.
use regex::Regex;
use thiserror::Error;

/// Errors that may occur while compiling a [`Pattern`].
#[derive(Debug, Error)]
pub enum Error {
    /// The glob translated into an expression the regex engine rejects, e.g. `[z-a]`.
    #[error("invalid glob pattern \"{pattern}\": {error}")]
    InvalidPattern {
        /// The glob as written.
        pattern: String,
        /// The underlying regex error.
        #[source]
        error: regex::Error,
    },
}

/// A compiled path-matching glob.
#[derive(Debug, Clone)]
pub struct Pattern {
    glob: String,
    regex: Regex,
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.glob == other.glob
    }
}

impl Eq for Pattern {}

impl Pattern {
    /// Compile `glob` into a [`Pattern`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPattern`] if a bracket expression is malformed.
    pub fn new(glob: &str) -> Result<Self, Error> {
        let mut body = translate(glob);
        if !body.ends_with('/') {
            body.push_str("/?");
        }

        Regex::new(&format!(r"^(?s:{})\z", body))
            .map(|regex| Self {
                glob: glob.to_owned(),
                regex,
            })
            .map_err(|error| Error::InvalidPattern {
                pattern: glob.to_owned(),
                error,
            })
    }

    /// The glob this pattern was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.glob
    }

    /// Whether the whole of `path` matches this pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

fn translate(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut regex = String::with_capacity(glob.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => {
                if chars.get(i) == Some(&'*') {
                    i += 1;
                    regex.push_str(".*");
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    push_class(&mut regex, &chars[i..end]);
                    i = end + 1;
                }
                None => regex.push_str(r"\["),
            },
            c => regex.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    regex
}

/// Index of the `]` closing a bracket expression whose contents start at `start`.
///
/// A `]` directly after the opening bracket (or after `[!`) is a literal member.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }

    chars
        .get(j..)?
        .iter()
        .position(|&c| c == ']')
        .map(|offset| j + offset)
}

fn push_class(regex: &mut String, content: &[char]) {
    regex.push('[');
    let content = match content.split_first() {
        Some(('!', rest)) => {
            regex.push('^');
            rest
        }
        _ => content,
    };

    let mut i = 0;
    while i < content.len() {
        push_class_member(regex, content[i]);
        if content.get(i + 1) == Some(&'-') && i + 2 < content.len() {
            regex.push('-');
            push_class_member(regex, content[i + 2]);
            i += 3;
        } else {
            i += 1;
        }
    }

    regex.push(']');
}

fn push_class_member(regex: &mut String, c: char) {
    // Set operations (`&&`, `--`, `~~`) and nested classes are syntax inside regex classes.
    if matches!(c, '\\' | '[' | ']' | '^' | '-' | '&' | '~' | '|') {
        regex.push('\\');
    }
    regex.push(c);
}
