//! Password strength estimation and generation

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::CharClasses;

const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const NUMBERS: &str = "0123456789";
const SPECIAL: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Estimated strength, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl fmt::Display for PasswordStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PasswordStrength::Weak => "weak",
            PasswordStrength::Medium => "medium",
            PasswordStrength::Strong => "strong",
            PasswordStrength::VeryStrong => "veryStrong",
        };
        f.write_str(label)
    }
}

/// Score a password out of 7 and map it onto a strength bucket
///
/// One point each for length >= 8, >= 12 and >= 16, and for containing an
/// uppercase letter, a lowercase letter, a digit and a special symbol.
/// Anything shorter than 6 characters is weak regardless of its contents.
pub fn check_password_strength(password: &str) -> PasswordStrength {
    let length = password.chars().count();
    if length < 6 {
        return PasswordStrength::Weak;
    }

    let classes = CharClasses::of(password);
    let score = [
        length >= 8,
        length >= 12,
        length >= 16,
        classes.upper,
        classes.lower,
        classes.digit,
        classes.special,
    ]
    .iter()
    .filter(|&&point| point)
    .count();

    match score {
        0..=2 => PasswordStrength::Weak,
        3..=4 => PasswordStrength::Medium,
        5..=6 => PasswordStrength::Strong,
        _ => PasswordStrength::VeryStrong,
    }
}

/// Character classes and length for [`generate_random_password`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordOptions {
    pub length: usize,
    pub uppercase: bool,
    pub lowercase: bool,
    pub numbers: bool,
    pub special: bool,
}

impl Default for PasswordOptions {
    fn default() -> Self {
        Self {
            length: 16,
            uppercase: true,
            lowercase: true,
            numbers: true,
            special: true,
        }
    }
}

impl PasswordOptions {
    /// Default classes with a custom length
    pub fn with_length(length: usize) -> Self {
        Self {
            length,
            ..Self::default()
        }
    }

    fn alphabet(&self) -> Vec<char> {
        let mut alphabet = String::new();
        if self.uppercase {
            alphabet.push_str(UPPERCASE);
        }
        if self.lowercase {
            alphabet.push_str(LOWERCASE);
        }
        if self.numbers {
            alphabet.push_str(NUMBERS);
        }
        if self.special {
            alphabet.push_str(SPECIAL);
        }

        if alphabet.is_empty() {
            alphabet.push_str(LOWERCASE);
            alphabet.push_str(NUMBERS);
        }

        alphabet.chars().collect()
    }
}

/// Generate a random password
///
/// Each character is drawn independently and uniformly from the enabled
/// classes using the thread-local CSPRNG. With every class disabled the
/// alphabet falls back to lowercase letters and digits.
pub fn generate_random_password(options: &PasswordOptions) -> String {
    let alphabet = options.alphabet();
    let mut rng = rand::rng();

    (0..options.length)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())])
        .collect()
}
