//! Universal properties of the content classifier

use proptest::prelude::*;

use nexusclip::classifier::{
    check_password_strength, classify, generate_random_password, Classification, ContentType,
    PasswordOptions, PasswordStrength,
};

proptest! {
    #[test]
    fn http_prefix_is_always_a_link(rest in "\\PC*", secure in any::<bool>()) {
        let scheme = if secure { "https://" } else { "http://" };
        let text = format!("{}{}", scheme, rest);
        prop_assert_eq!(classify(&text), ContentType::Link);
    }

    #[test]
    fn simple_addresses_are_emails(
        user in "[a-z0-9._]{1,12}",
        domain in "[a-z]{1,12}",
        tld in "[a-z]{2,6}",
    ) {
        let text = format!("{}@{}.{}", user, domain, tld);
        prop_assert_eq!(classify(&text), ContentType::Email);
    }

    #[test]
    fn digit_runs_are_phones(number in "\\+?[0-9]{10,14}") {
        prop_assert_eq!(classify(&number), ContentType::Phone);
    }

    #[test]
    fn language_is_only_set_for_code(text in "\\PC{0,200}") {
        let classification = Classification::of(&text);
        if classification.content_type != ContentType::Code {
            prop_assert!(classification.language.is_none());
        }
    }

    #[test]
    fn short_passwords_are_weak(password in "\\PC{0,5}") {
        prop_assert_eq!(check_password_strength(&password), PasswordStrength::Weak);
    }

    #[test]
    fn generated_passwords_have_requested_length(
        length in 1usize..=128,
        uppercase in any::<bool>(),
        lowercase in any::<bool>(),
        numbers in any::<bool>(),
        special in any::<bool>(),
    ) {
        let options = PasswordOptions { length, uppercase, lowercase, numbers, special };
        let password = generate_random_password(&options);
        prop_assert_eq!(password.chars().count(), length);

        if !uppercase {
            prop_assert!(!password.chars().any(|c| c.is_ascii_uppercase()));
        }
        if !numbers && (uppercase || lowercase || special) {
            prop_assert!(!password.chars().any(|c| c.is_ascii_digit()));
        }
    }
}

#[test]
fn test_realistic_clipboard_samples() {
    let samples = [
        ("https://github.com/rust-lang/rust", ContentType::Link),
        ("  someone@example.org\n", ContentType::Email),
        ("fn main() { println!(\"hi\"); }", ContentType::Code),
        ("Tr0ub4dor&3", ContentType::Password),
        ("+1 555 010 9999", ContentType::Phone),
        ("Meeting moved to Thursday", ContentType::Text),
        ("", ContentType::Text),
    ];

    for (text, expected) in samples {
        assert_eq!(classify(text), expected, "sample {:?}", text);
    }
}
