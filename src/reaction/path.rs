//! Connection strings.
//!
//! ```text
//! ["!"] segment ("." segment)* [":" label]
//! segment = identifier ["*" | "**"]
//! ```
//!
//! - `!` suppresses the unknown-event-type warning.
//! - `*` fans out over the items of a list value; `**` does so recursively.
//! - The last segment names the event type.
//! - The label orders subscriptions (default: the reaction's name).
//!
//! Two deprecated spellings are accepted with a warning: `a.*.b` (same as
//! `a*.b`) and a `!` that is not at the start.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Fan-out marker of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    None,
    /// `*`: each item of a list.
    Each,
    /// `**`: each item, and recursively the same name on each item.
    Deep,
    /// Internal form of `**` while recursing: the segment may also be absent.
    DeepOptional,
}

impl Selector {
    pub(crate) fn is_deep(self) -> bool {
        matches!(self, Selector::Deep | Selector::DeepOptional)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub selector: Selector,
}

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPath {
    fullname: String,
    segments: Vec<Segment>,
    label: Option<String>,
    force: bool,
}

impl ConnectionPath {
    pub fn parse(input: &str) -> Result<Self> {
        let force = input.starts_with('!');
        let (path, label) = match input.trim_start_matches('!').split_once(':') {
            Some((path, label)) => (path, Some(label)),
            None => (input.trim_start_matches('!'), None),
        };
        let mut path = path.to_string();
        let mut force = force;

        if format!("{path}.").contains(".*.") {
            let fixed = path.replace(".*", "*");
            tracing::warn!(
                "connection string syntax \"foo.*.bar\" is deprecated, use {fixed:?} instead of {path:?}"
            );
            path = fixed;
        }
        if path.contains('!') {
            let fixed = path.replace('!', "");
            tracing::warn!("`!` must come at the very start of a connection string, use \"!{fixed}\"");
            path = fixed;
            force = true;
        }

        let label = match label {
            Some("") | None => None,
            Some(label) if label.starts_with("reconnect_") => {
                return Err(Error::connection(input, "labels starting with `reconnect_` are reserved"));
            }
            Some(label) => Some(label.to_string()),
        };

        let mut segments = Vec::new();
        for part in path.split('.') {
            let name = part.trim_end_matches('*');
            let selector = match part.len() - name.len() {
                0 => Selector::None,
                1 => Selector::Each,
                2 => Selector::Deep,
                _ => {
                    return Err(Error::connection(input, format!("too many stars in {part:?}")));
                }
            };
            let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(Error::connection(input, format!("non-identifier part {name:?}")));
            }
            segments.push(Segment {
                name: name.to_string(),
                selector,
            });
        }

        Ok(Self {
            fullname: input.to_string(),
            segments,
            label,
            force,
        })
    }

    /// The string as written.
    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// True if unknown event types should not be warned about.
    pub fn is_forced(&self) -> bool {
        self.force
    }

    /// Event type: the last segment's name.
    pub fn event_type(&self) -> &str {
        self.segments.last().map(|s| s.name.as_str()).unwrap_or_default()
    }

    /// `<event type>:<label>`, falling back to `default_label`.
    pub fn type_label(&self, default_label: &str) -> String {
        format!("{}:{}", self.event_type(), self.label().unwrap_or(default_label))
    }
}

impl FromStr for ConnectionPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple() {
        let p = ConnectionPath::parse("foo").unwrap();
        assert_eq!(p.event_type(), "foo");
        assert_eq!(p.label(), None);
        assert!(!p.is_forced());
        assert_eq!(p.type_label("r1"), "foo:r1");
    }

    #[test]
    fn test_full_syntax() {
        let p: ConnectionPath = "!foo.bar*.spam.eggs**:meh".parse().unwrap();
        assert!(p.is_forced());
        assert_eq!(p.label(), Some("meh"));
        let selectors: Vec<_> = p.segments().iter().map(|s| s.selector).collect();
        assert_eq!(
            selectors,
            vec![Selector::None, Selector::Each, Selector::None, Selector::Deep]
        );
        assert_eq!(p.event_type(), "eggs");
        assert_eq!(p.type_label("x"), "eggs:meh");
        assert_eq!(p.fullname(), "!foo.bar*.spam.eggs**:meh");
    }

    #[test]
    fn test_label_may_hold_any_chars() {
        let p = ConnectionPath::parse("a:b.c!d").unwrap();
        assert_eq!(p.label(), Some("b.c!d"));
        assert!(!p.is_forced());
    }

    #[test]
    fn test_deprecated_spellings() {
        let p = ConnectionPath::parse("children.*.foo").unwrap();
        assert_eq!(p.segments()[0].selector, Selector::Each);
        assert_eq!(p.segments().len(), 2);

        let p = ConnectionPath::parse("foo.!bar").unwrap();
        assert!(p.is_forced());
        assert_eq!(p.event_type(), "bar");
    }

    #[test]
    fn test_invalid() {
        for bad in ["", "a..b", "a.b-c", "a***", "*", "a:reconnect_0"] {
            assert!(
                matches!(ConnectionPath::parse(bad), Err(Error::InvalidConnectionString { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
