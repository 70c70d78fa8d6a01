//! Identifier case conversion.
//!
//! Entity and member names are written in `PascalCase` in query trees; the
//! physical schema may use another convention. [`NamingConvention`] selects
//! the transform, which the entity resolver applies once per resolution.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How logical names map to physical table and column names.
///
/// # Examples
///
/// ```
/// use tessera_core::utils::text::NamingConvention;
///
/// assert_eq!(NamingConvention::AsIs.apply("UserName"), "UserName");
/// assert_eq!(NamingConvention::SnakeCase.apply("UserName"), "user_name");
/// assert_eq!(NamingConvention::CamelCase.apply("UserName"), "userName");
/// assert_eq!(NamingConvention::UrlCase.apply("UserName"), "user-name");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// Physical names equal logical names.
    #[default]
    AsIs,
    /// `user_name`
    SnakeCase,
    /// `userName`
    CamelCase,
    /// `user-name`
    UrlCase,
}

impl NamingConvention {
    /// Applies this convention to a logical name.
    pub fn apply(self, name: &str) -> String {
        match self {
            Self::AsIs => name.to_string(),
            Self::SnakeCase => to_snake_case(name),
            Self::CamelCase => to_camel_case(name),
            Self::UrlCase => to_url_case(name),
        }
    }
}

impl fmt::Display for NamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AsIs => "as_is",
            Self::SnakeCase => "snake_case",
            Self::CamelCase => "camel_case",
            Self::UrlCase => "url_case",
        };
        f.write_str(name)
    }
}

impl FromStr for NamingConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "as_is" | "asis" | "none" => Ok(Self::AsIs),
            "snake_case" | "snake" => Ok(Self::SnakeCase),
            "camel_case" | "camel" => Ok(Self::CamelCase),
            "url_case" | "url" | "kebab" | "kebab_case" => Ok(Self::UrlCase),
            other => Err(format!("unknown naming convention '{other}'")),
        }
    }
}

/// Splits an identifier into words on separators and case boundaries.
///
/// Acronym runs stay together (`HTTPServer` -> `HTTP`, `Server`) and digits
/// stick to the word they follow.
fn split_words(s: &str) -> Vec<String> {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    let separator = SEPARATOR.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

    let mut words = Vec::new();
    for chunk in separator.split(s).filter(|c| !c.is_empty()) {
        let chars: Vec<char> = chunk.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            if i > 0 && c.is_uppercase() {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next_is_lower)
                {
                    words.push(std::mem::take(&mut current));
                }
            }
            current.push(c);
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
}

/// Converts an identifier to `snake_case`.
///
/// # Examples
///
/// ```
/// use tessera_core::utils::text::to_snake_case;
///
/// assert_eq!(to_snake_case("UserName"), "user_name");
/// assert_eq!(to_snake_case("HTTPServer"), "http_server");
/// ```
pub fn to_snake_case(s: &str) -> String {
    split_words(s)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Converts an identifier to `camelCase`.
///
/// # Examples
///
/// ```
/// use tessera_core::utils::text::to_camel_case;
///
/// assert_eq!(to_camel_case("UserName"), "userName");
/// assert_eq!(to_camel_case("user_id"), "userId");
/// ```
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, word) in split_words(s).iter().enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

/// Converts an identifier to URL case (`lower-hyphenated`).
pub fn to_url_case(s: &str) -> String {
    split_words(s)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}
