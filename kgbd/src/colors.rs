//! IRC text styling.
//!
//! Styled fragments are wrapped in the classic in-band escape bytes: `^B`
//! bold, `^_` underline, `^V` reverse, `^C` plus a two-digit colour index,
//! all terminated by `^O`.

use serde::Deserialize;
use std::collections::HashMap;

pub const BOLD: char = '\x02';
pub const UNDERLINE: char = '\x1f';
pub const REVERSE: char = '\x16';
pub const COLOR: char = '\x03';
pub const RESET: char = '\x0f';

/// Named mirc-style colours. Indices run 01..16 with 15 unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    Navy,
    Green,
    Red,
    Brown,
    Purple,
    Orange,
    Yellow,
    Lime,
    Teal,
    Aqua,
    Blue,
    Fuchsia,
    Silver,
    White,
}

impl Color {
    fn index(self) -> u8 {
        match self {
            Color::Black => 1,
            Color::Navy => 2,
            Color::Green => 3,
            Color::Red => 4,
            Color::Brown => 5,
            Color::Purple => 6,
            Color::Orange => 7,
            Color::Yellow => 8,
            Color::Lime => 9,
            Color::Teal => 10,
            Color::Aqua => 11,
            Color::Blue => 12,
            Color::Fuchsia => 13,
            Color::Silver => 14,
            Color::White => 16,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "black" => Color::Black,
            "navy" => Color::Navy,
            "green" => Color::Green,
            "red" => Color::Red,
            "brown" => Color::Brown,
            "purple" => Color::Purple,
            "orange" => Color::Orange,
            "yellow" => Color::Yellow,
            "lime" => Color::Lime,
            "teal" => Color::Teal,
            "aqua" => Color::Aqua,
            "blue" => Color::Blue,
            "fuchsia" => Color::Fuchsia,
            "silver" => Color::Silver,
            "white" => Color::White,
            _ => return None,
        })
    }
}

/// One styling token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Bold,
    Underline,
    Reverse,
    Color(Color),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown style {0:?}")]
pub struct UnknownStyle(pub String);

/// Parse a whitespace-separated style spec like `"bold red"`.
pub fn parse_styles(spec: &str) -> Result<Vec<Style>, UnknownStyle> {
    spec.split_whitespace()
        .map(|token| match token {
            "bold" => Ok(Style::Bold),
            "underline" => Ok(Style::Underline),
            "reverse" => Ok(Style::Reverse),
            other => Color::from_name(other)
                .map(Style::Color)
                .ok_or_else(|| UnknownStyle(other.to_string())),
        })
        .collect()
}

/// Wrap text in the escape codes for the given styles.
pub fn wrap(text: &str, styles: &[Style]) -> String {
    if styles.is_empty() || text.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 8);
    for style in styles {
        match style {
            Style::Bold => out.push(BOLD),
            Style::Underline => out.push(UNDERLINE),
            Style::Reverse => out.push(REVERSE),
            Style::Color(c) => {
                out.push(COLOR);
                out.push_str(&format!("{:02}", c.index()));
            }
        }
    }
    out.push_str(text);
    out.push(RESET);
    out
}

/// Remove every styling escape, leaving the plain text.
pub fn strip(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            BOLD | UNDERLINE | REVERSE | RESET => {}
            COLOR => {
                for _ in 0..2 {
                    if chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                        chars.next();
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Which style each announcement element is rendered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorScheme {
    pub repository: Vec<Style>,
    pub revision: Vec<Style>,
    pub path: Vec<Style>,
    pub author: Vec<Style>,
    pub branch: Vec<Style>,
    pub module: Vec<Style>,
    pub addition: Vec<Style>,
    pub modification: Vec<Style>,
    pub deletion: Vec<Style>,
    pub replacement: Vec<Style>,
    pub prop_change: Vec<Style>,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            repository: vec![Style::Bold],
            revision: vec![Style::Bold],
            path: vec![Style::Color(Color::Teal)],
            author: vec![Style::Color(Color::Green)],
            branch: vec![Style::Color(Color::Brown)],
            module: vec![Style::Color(Color::Purple)],
            addition: vec![Style::Color(Color::Green)],
            modification: vec![Style::Color(Color::Teal)],
            deletion: vec![Style::Bold, Style::Color(Color::Red)],
            replacement: vec![Style::Reverse],
            prop_change: vec![Style::Underline],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemeError {
    #[error("unknown colour element {0:?}")]
    UnknownElement(String),
    #[error("element {element:?}: {source}")]
    BadStyle {
        element: String,
        source: UnknownStyle,
    },
}

impl ColorScheme {
    /// Default scheme with per-element overrides from the config file.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Result<Self, SchemeError> {
        let mut scheme = Self::default();
        for (element, spec) in overrides {
            let styles = parse_styles(spec).map_err(|source| SchemeError::BadStyle {
                element: element.clone(),
                source,
            })?;
            match element.as_str() {
                "repository" => scheme.repository = styles,
                "revision" => scheme.revision = styles,
                "path" => scheme.path = styles,
                "author" => scheme.author = styles,
                "branch" => scheme.branch = styles,
                "module" => scheme.module = styles,
                "addition" => scheme.addition = styles,
                "modification" => scheme.modification = styles,
                "deletion" => scheme.deletion = styles,
                "replacement" => scheme.replacement = styles,
                "prop_change" => scheme.prop_change = styles,
                other => return Err(SchemeError::UnknownElement(other.to_string())),
            }
        }
        Ok(scheme)
    }
}

// serde hook so `colors:` deserialises straight into a resolved scheme.
impl<'de> Deserialize<'de> for ColorScheme {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = HashMap::<String, String>::deserialize(deserializer)?;
        ColorScheme::with_overrides(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_emits_codes_and_terminator() {
        assert_eq!(wrap("x", &[Style::Bold]), "\x02x\x0f");
        assert_eq!(wrap("p", &[Style::Color(Color::Teal)]), "\x0310p\x0f");
        assert_eq!(
            wrap("d", &[Style::Bold, Style::Color(Color::Red)]),
            "\x02\x0304d\x0f"
        );
        assert_eq!(wrap("plain", &[]), "plain");
    }

    #[test]
    fn colour_indices_skip_fifteen() {
        assert_eq!(Color::Silver.index(), 14);
        assert_eq!(Color::White.index(), 16);
    }

    #[test]
    fn strip_removes_every_escape() {
        let styled = format!(
            "{} {} {}",
            wrap("repo", &[Style::Bold]),
            wrap("alice", &[Style::Color(Color::Green)]),
            wrap("path", &[Style::Underline, Style::Color(Color::Teal)])
        );
        assert_eq!(strip(&styled), "repo alice path");
    }

    #[test]
    fn strip_leaves_digits_outside_colour_codes() {
        assert_eq!(strip("r1 file2"), "r1 file2");
    }

    #[test]
    fn parse_styles_accepts_combined_specs() {
        assert_eq!(
            parse_styles("bold red").unwrap(),
            vec![Style::Bold, Style::Color(Color::Red)]
        );
        assert!(parse_styles("sparkly").is_err());
    }

    #[test]
    fn scheme_overrides_replace_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("author".to_string(), "bold navy".to_string());
        let scheme = ColorScheme::with_overrides(&overrides).unwrap();
        assert_eq!(scheme.author, vec![Style::Bold, Style::Color(Color::Navy)]);
        assert_eq!(scheme.repository, vec![Style::Bold]);
    }

    #[test]
    fn scheme_rejects_unknown_elements() {
        let mut overrides = HashMap::new();
        overrides.insert("glitter".to_string(), "bold".to_string());
        assert!(matches!(
            ColorScheme::with_overrides(&overrides),
            Err(SchemeError::UnknownElement(_))
        ));
    }
}
