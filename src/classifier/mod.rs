//! Content classification for copied text
//!
//! Classification is a priority-ordered cascade: link, email, code,
//! password, phone, then plain text. The first check that matches wins.
//! Code snippets additionally get a best-guess language tag.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod password;

pub use password::{
    check_password_strength, generate_random_password, PasswordOptions, PasswordStrength,
};

/// Semantic type of a clipboard item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Link,
    Email,
    Phone,
    Code,
    Password,
    /// Assigned only when a user saves a template; never produced by [`classify`]
    Template,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Link => "link",
            ContentType::Email => "email",
            ContentType::Phone => "phone",
            ContentType::Code => "code",
            ContentType::Password => "password",
            ContentType::Template => "template",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Programming language guessed for a code snippet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Dart,
    Go,
    Python,
    JavaScript,
    Java,
    Kotlin,
    Cpp,
    Php,
    Html,
    Css,
}

impl Language {
    /// Tag used by the storage layer (`dart`, `go`, `python`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Dart => "dart",
            Language::Go => "go",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
            Language::Cpp => "cpp",
            Language::Php => "php",
            Language::Html => "html",
            Language::Css => "css",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification result handed to the storage layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub content_type: ContentType,
    /// Only ever set when `content_type` is [`ContentType::Code`]
    pub language: Option<Language>,
}

impl Classification {
    /// Classify `text` and, for code, detect its language
    pub fn of(text: &str) -> Self {
        let content_type = classify(text);
        let language = match content_type {
            ContentType::Code => detect_language(text),
            _ => None,
        };

        Self {
            content_type,
            language,
        }
    }
}

/// Characters counted as "special" by the password heuristics
pub(crate) const SPECIAL_SYMBOLS: &str = "!@#$%^&*(),.?\":{}|<>";

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+]?[0-9\s-]{10,15}$").unwrap());

/// Any single match marks the text as code
static CODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Language keywords
        Regex::new(
            r"\b(void|class|function|const|var|let|def|import|return|if|else|for|while|switch|case)\b",
        )
        .unwrap(),
        // Braces and statement terminators
        Regex::new(r"[{};]").unwrap(),
        // OOP modifiers
        Regex::new(r"\b(public|private|protected|static|final|abstract)\b").unwrap(),
        // Built-in type names
        Regex::new(r"\b(int|string|bool|float|double|List|Map|Set|String|Int|Boolean)\b").unwrap(),
        // Module imports at the start of a line
        Regex::new(r"(?m)^(import|from|package|require|include)").unwrap(),
        // Arrows and string interpolation
        Regex::new(r"=>|->|\$\{|\$\w").unwrap(),
    ]
});

/// Classify copied text
///
/// Link and code checks run against the text as given; email and phone
/// checks run against a trimmed copy. Never fails: anything unrecognised,
/// including empty input, is [`ContentType::Text`].
pub fn classify(text: &str) -> ContentType {
    let trimmed = text.trim();

    if is_link(text) {
        ContentType::Link
    } else if EMAIL_PATTERN.is_match(trimmed) {
        ContentType::Email
    } else if looks_like_code(text) {
        ContentType::Code
    } else if looks_like_password(text) {
        ContentType::Password
    } else if PHONE_PATTERN.is_match(trimmed) {
        ContentType::Phone
    } else {
        ContentType::Text
    }
}

/// Guess the language of a code snippet
///
/// Checks run in a fixed order and the first hit wins, so a snippet with
/// both `var ` and `function` is JavaScript rather than Kotlin.
pub fn detect_language(text: &str) -> Option<Language> {
    let has = |needle: &str| text.contains(needle);

    if has("flutter") || has("Widget") || has("BuildContext") {
        Some(Language::Dart)
    } else if has("func ") || has("package main") {
        Some(Language::Go)
    } else if has("def ") || (has("import ") && has(":")) {
        Some(Language::Python)
    } else if has("function") || has("=>") || has("const ") {
        Some(Language::JavaScript)
    } else if has("public class") || has("private void") {
        Some(Language::Java)
    } else if has("fun ") || has("val ") || has("var ") {
        Some(Language::Kotlin)
    } else if has("#include") || has("std::") {
        Some(Language::Cpp)
    } else if has("<?php") {
        Some(Language::Php)
    } else if has("<html") || has("<div") || has("<span") {
        Some(Language::Html)
    } else if has("{") && has(":") && has(";") {
        Some(Language::Css)
    } else {
        None
    }
}

fn is_link(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}

fn looks_like_code(text: &str) -> bool {
    CODE_PATTERNS.iter().any(|pattern| pattern.is_match(text))
}

fn looks_like_password(text: &str) -> bool {
    let length = text.chars().count();
    if !(8..=64).contains(&length) || text.contains(' ') {
        return false;
    }

    let classes = CharClasses::of(text);
    (classes.upper && classes.lower && classes.digit)
        || (classes.digit && classes.special)
        || (classes.upper && classes.lower && classes.special)
}

/// Which character classes a string contains
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CharClasses {
    pub upper: bool,
    pub lower: bool,
    pub digit: bool,
    pub special: bool,
}

impl CharClasses {
    pub(crate) fn of(text: &str) -> Self {
        let mut classes = Self::default();
        for c in text.chars() {
            if c.is_ascii_uppercase() {
                classes.upper = true;
            } else if c.is_ascii_lowercase() {
                classes.lower = true;
            } else if c.is_ascii_digit() {
                classes.digit = true;
            } else if SPECIAL_SYMBOLS.contains(c) {
                classes.special = true;
            }
        }
        classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_links() {
        assert_eq!(classify("https://example.com/path?q=1"), ContentType::Link);
        assert_eq!(classify("http://localhost:8080"), ContentType::Link);
        // Scheme is case-sensitive and anchored
        assert_eq!(classify("HTTPS://EXAMPLE.COM"), ContentType::Text);
        assert_eq!(classify("see https://example.com"), ContentType::Text);
    }

    #[test]
    fn test_link_wins_over_code_markers() {
        assert_eq!(
            classify("https://example.com/search?a=1;b={x}"),
            ContentType::Link
        );
    }

    #[test]
    fn test_emails() {
        assert_eq!(classify("someone@example.com"), ContentType::Email);
        assert_eq!(classify("  first.last@mail.example.org \n"), ContentType::Email);
        assert_eq!(classify("someone@localhost"), ContentType::Text);
        assert_eq!(classify("some one@example.com"), ContentType::Text);
        assert_eq!(classify("a@b@example.com"), ContentType::Text);
    }

    #[test]
    fn test_code() {
        assert_eq!(classify("int x = 5; return x;"), ContentType::Code);
        assert_eq!(classify("const add = (a, b) => a + b"), ContentType::Code);
        assert_eq!(classify("println!(\"{}\", x)"), ContentType::Code);
        assert_eq!(classify("echo $HOME"), ContentType::Code);
        assert_eq!(classify("package main"), ContentType::Code);
        assert_eq!(classify("x -> x * 2"), ContentType::Code);
    }

    #[test]
    fn test_keywords_need_word_boundaries() {
        // "classy" and "format" contain keywords but not as whole words
        assert_eq!(classify("a classy format"), ContentType::Text);
    }

    #[test]
    fn test_passwords() {
        assert_eq!(classify("Tr0ub4dorXyz"), ContentType::Password);
        assert_eq!(classify("hunter2!"), ContentType::Password);
        assert_eq!(classify("Secret!Pass"), ContentType::Password);
        // Too short, too simple, or contains a space
        assert_eq!(classify("Ab1"), ContentType::Text);
        assert_eq!(classify("alllowercase"), ContentType::Text);
        assert_eq!(classify("Pass word 123"), ContentType::Text);
    }

    #[test]
    fn test_password_length_bounds() {
        let at_limit = format!("Aa1{}", "b".repeat(61));
        assert_eq!(at_limit.len(), 64);
        assert_eq!(classify(&at_limit), ContentType::Password);

        let over_limit = format!("Aa1{}", "b".repeat(62));
        assert_eq!(classify(&over_limit), ContentType::Text);
    }

    #[test]
    fn test_phones() {
        assert_eq!(classify("0123456789"), ContentType::Phone);
        assert_eq!(classify("+1 555 123 4567"), ContentType::Phone);
        assert_eq!(classify(" 555-123-4567 "), ContentType::Phone);
        assert_eq!(classify("12345"), ContentType::Text);
    }

    #[test]
    fn test_password_shadows_phone() {
        // Digits plus a special symbol satisfy the password heuristic first
        assert_eq!(classify("+15551234567."), ContentType::Password);
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(classify(""), ContentType::Text);
        assert_eq!(classify("   \n\t"), ContentType::Text);
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(classify("Hello world"), ContentType::Text);
        assert_eq!(classify("Groceries: milk, eggs"), ContentType::Text);
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(
            detect_language("Widget build(BuildContext context) {}"),
            Some(Language::Dart)
        );
        assert_eq!(
            detect_language("package main\nfunc main(){}"),
            Some(Language::Go)
        );
        assert_eq!(detect_language("def foo():\n    return 1"), Some(Language::Python));
        assert_eq!(detect_language("import os\nif x: pass"), Some(Language::Python));
        assert_eq!(detect_language("var x = function(){}"), Some(Language::JavaScript));
        assert_eq!(
            detect_language("public class Main { }"),
            Some(Language::Java)
        );
        assert_eq!(detect_language("val x = 1"), Some(Language::Kotlin));
        assert_eq!(detect_language("#include <stdio.h>"), Some(Language::Cpp));
        assert_eq!(detect_language("<?php echo 1;"), Some(Language::Php));
        assert_eq!(detect_language("<div>hi</div>"), Some(Language::Html));
        assert_eq!(detect_language("body { color: red; }"), Some(Language::Css));
        assert_eq!(detect_language("x = y;"), None);
    }

    #[test]
    fn test_classification_only_tags_code() {
        let code = Classification::of("package main\nfunc main() {}");
        assert_eq!(code.content_type, ContentType::Code);
        assert_eq!(code.language, Some(Language::Go));

        // Contains "def " but is a link, so no language
        let link = Classification::of("https://example.com/def abc");
        assert_eq!(link.content_type, ContentType::Link);
        assert_eq!(link.language, None);
    }

    #[test]
    fn test_tags_serialize_lowercase() {
        let json = serde_json::to_string(&Classification::of("const x = 1")).unwrap();
        assert_eq!(json, r#"{"content_type":"code","language":"javascript"}"#);
    }
}
