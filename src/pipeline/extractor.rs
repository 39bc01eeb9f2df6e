use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::core::types::RawIndicators;

lazy_static! {
    pub static ref URL: Regex = Regex::new(
        r#"(?i)\b(?:https?|hxxps?)://[^\s"'<>]+"#
    ).expect("URL regex is valid");

    // Labels may be separated by a defanged dot.
    pub static ref DOMAIN: Regex = Regex::new(
        r"\b(?:[a-zA-Z0-9-]+(?:\.|\[\.\]|\(\.\)))+[a-zA-Z]{2,}\b"
    ).expect("DOMAIN regex is valid");

    pub static ref IPV4: Regex = Regex::new(
        r"\b(?:\d{1,3}\.){3}\d{1,3}\b"
    ).expect("IPV4 regex is valid");
}

/// Pulls candidate indicators out of free text. No semantic validation.
pub fn extract_indicators(body: &str) -> RawIndicators {
    RawIndicators {
        urls: find_all(&URL, body),
        domains: find_all(&DOMAIN, body),
        ips: find_all(&IPV4, body),
    }
}

fn find_all(re: &Regex, body: &str) -> Vec<String> {
    re.find_iter(body)
        .map(|m| m.as_str().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
