//! Name validation for blocks and signals.

use std::fmt;

/// Characters that separate levels of a hierarchical name.
pub const RESERVED_CHARS: &[char] = &['/', '~', '.', ' '];

/// Separator between a parent's full name and a signal label.
pub const SIGNAL_SEPARATOR: char = '~';

/// Why a requested name was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingIssue {
    Empty,
    InvalidCharacters,
    Collision,
}

impl fmt::Display for NamingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingIssue::Empty => write!(f, "name is empty"),
            NamingIssue::InvalidCharacters => write!(f, "name contains reserved characters"),
            NamingIssue::Collision => write!(f, "name is already in use"),
        }
    }
}

/// A name substitution performed while building a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub requested: String,
    pub assigned: String,
    pub issue: NamingIssue,
}

/// Check a bare (single-level) name for emptiness and reserved characters.
pub fn check_name(name: &str) -> Option<NamingIssue> {
    if name.is_empty() {
        Some(NamingIssue::Empty)
    } else if name.contains(RESERVED_CHARS) {
        Some(NamingIssue::InvalidCharacters)
    } else {
        None
    }
}

/// Generate `<prefix>_<n>` names from `counter` until one is free.
pub fn generate_name(prefix: &str, counter: &mut usize, taken: impl Fn(&str) -> bool) -> String {
    loop {
        let candidate = format!("{prefix}_{counter}");
        *counter += 1;
        if !taken(&candidate) {
            return candidate;
        }
    }
}
