//! PII and secret redaction for log output.
//!
//! Redaction is lossy and one-way. The redacted copy is the only form of
//! ticket text that may reach a log line.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Order matters: secrets and emails first, then cards before SSNs and
    // phone numbers so a long digit run is not partially eaten.
    static ref REDACTION_RULES: Vec<(Regex, &'static str)> = vec![
        (
            Regex::new(r"(?i)\b(?:sk|pk|rk|api|key|token|ghp|xox[abp])[-_][A-Za-z0-9_\-]{16,}\b").unwrap(),
            "[SECRET]",
        ),
        (
            Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9\-_.=]{16,}").unwrap(),
            "[SECRET]",
        ),
        (
            Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap(),
            "[EMAIL]",
        ),
        (
            Regex::new(r"\b[A-Za-z0-9]{32,}\b").unwrap(),
            "[SECRET]",
        ),
        (
            Regex::new(r"\b(?:\d[ \-]?){12,18}\d\b").unwrap(),
            "[CARD]",
        ),
        (
            Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
            "[SSN]",
        ),
        (
            Regex::new(r"(?:\+\d{1,3}[\s.\-]?)?(?:\(\d{3}\)|\b\d{3})[\s.\-]?\d{3}[\s.\-]?\d{4}\b").unwrap(),
            "[PHONE]",
        ),
    ];
}

/// Return a copy of `text` with emails, phone numbers, card-like numbers,
/// SSN-like groups and API-key-like tokens replaced by placeholders.
pub fn redact(text: &str) -> String {
    REDACTION_RULES
        .iter()
        .fold(text.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_redacted() {
        let out = redact("contact me at alice@example.com please");
        assert_eq!(out, "contact me at [EMAIL] please");
    }

    #[test]
    fn test_phone_formats_redacted() {
        for phone in ["(555) 123-4567", "555-123-4567", "555.123.4567", "+1 555 123 4567"] {
            let out = redact(&format!("call {} now", phone));
            assert!(!out.contains("123"), "phone not redacted: {}", out);
            assert!(out.contains("[PHONE]"));
        }
    }

    #[test]
    fn test_card_redacted() {
        assert_eq!(redact("card 4111111111111111 declined"), "card [CARD] declined");
        assert_eq!(redact("card 4111 1111 1111 1111 declined"), "card [CARD] declined");
    }

    #[test]
    fn test_ssn_redacted() {
        assert_eq!(redact("ssn 123-45-6789"), "ssn [SSN]");
    }

    #[test]
    fn test_api_keys_redacted() {
        let out = redact("my key is sk-abcdef1234567890ABCDEF and it leaked");
        assert!(!out.contains("abcdef1234567890"));
        assert!(out.contains("[SECRET]"));

        let out = redact("token 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08");
        assert_eq!(out, "token [SECRET]");
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "Customer cannot log in, error code 500, very urgent!!!";
        assert_eq!(redact(text), text);
    }
}
