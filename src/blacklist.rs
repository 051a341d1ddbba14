//! Detection of archived captures that are not real page content

/// Phrases that only appear in error pages, redirects and broken captures
const FORBIDDEN_PHRASES: &[&str] = &[
    "HTTP 301",
    "404 Not Found",
    "404 - Not Found",
    "Access Denied",
    "meta http-equiv=\"refresh\"",
    "Connection Failure",
    "Connection Timeout",
    "coldfusion.bootstrap",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Good,
    /// Every forbidden phrase found in the content
    Blacklisted(Vec<&'static str>),
}

impl Verdict {
    pub fn is_blacklisted(&self) -> bool {
        matches!(self, Verdict::Blacklisted(_))
    }
}

pub fn classify(content: &str) -> Verdict {
    let found: Vec<&'static str> = FORBIDDEN_PHRASES
        .iter()
        .copied()
        .filter(|phrase| content.contains(phrase))
        .collect();

    if found.is_empty() {
        Verdict::Good
    } else {
        Verdict::Blacklisted(found)
    }
}
