//! Multi-locale keyword catalogs for policy-URL classification.
//!
//! Two ordered token sets (cookie-policy and privacy-policy path keywords)
//! covering Spanish, English, French, German, Italian, Portuguese, Dutch,
//! and Swedish phrasings. The catalog is immutable data injected into the
//! classifier at construction so classification stays pure and testable.

/// Path keywords marking a URL as a cookie policy.
const COOKIE_KEYWORDS: &[&str] = &[
    // Español
    "cookies",
    "cookie",
    "politica-de-cookies",
    "política-de-cookies",
    // English
    "cookie-policy",
    "cookies-policy",
    // Français
    "politique-de-cookies",
    "cookies-et-traceurs",
    // Deutsch
    "cookie-richtlinie",
    // Italiano
    "informativa-cookie",
    // Português
    "politica-de-cookies",
    "política-de-cookies",
    // Nederlands
    "cookiebeleid",
    "cookieverklaring",
    // Svenska
    "kakor",
    "cookiepolicy",
];

/// Path keywords marking a URL as a privacy / data-protection policy.
const PRIVACY_KEYWORDS: &[&str] = &[
    // Español
    "privacidad",
    "politica-de-privacidad",
    "política-de-privacidad",
    "proteccion-de-datos",
    // English
    "privacy",
    "privacy-policy",
    "data-protection",
    // Français
    "confidentialite",
    "politique-de-confidentialite",
    "donnees-personnelles",
    // Deutsch
    "datenschutz",
    "datenschutzerklarung",
    // Italiano
    "informativa-privacy",
    "protezione-dei-dati",
    // Português
    "privacidade",
    "politica-de-privacidade",
    // Nederlands
    "privacyverklaring",
    "gegevensbescherming",
    // Svenska
    "integritet",
    "personuppgifter",
];

/// Immutable cookie/privacy keyword sets used by the classifier.
#[derive(Debug, Clone)]
pub struct KeywordCatalog {
    cookie_keywords: Vec<String>,
    privacy_keywords: Vec<String>,
}

impl KeywordCatalog {
    /// The built-in multi-locale catalog.
    pub fn builtin() -> Self {
        Self::new(
            COOKIE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            PRIVACY_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Build a catalog from custom keyword lists (mostly for tests).
    pub fn new(cookie_keywords: Vec<String>, privacy_keywords: Vec<String>) -> Self {
        Self {
            cookie_keywords,
            privacy_keywords,
        }
    }

    /// Whether the (lower-cased) URL stem contains any cookie-policy keyword.
    ///
    /// Pure membership testing; keyword order never matters.
    pub fn matches_cookie(&self, stem: &str) -> bool {
        self.cookie_keywords.iter().any(|k| stem.contains(k.as_str()))
    }

    /// Whether the (lower-cased) URL stem contains any privacy-policy keyword.
    pub fn matches_privacy(&self, stem: &str) -> bool {
        self.privacy_keywords.iter().any(|k| stem.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_common_paths() {
        let catalog = KeywordCatalog::builtin();
        assert!(catalog.matches_cookie("https://example.test/cookie-policy"));
        assert!(catalog.matches_cookie("https://example.test/politique-de-cookies"));
        assert!(catalog.matches_privacy("https://example.test/privacidad"));
        assert!(catalog.matches_privacy("https://example.test/datenschutz"));
        assert!(catalog.matches_privacy("https://example.test/personuppgifter"));
    }

    #[test]
    fn both_tags_can_apply() {
        let catalog = KeywordCatalog::builtin();
        let stem = "https://example.test/privacy-and-cookie-policy";
        assert!(catalog.matches_cookie(stem));
        assert!(catalog.matches_privacy(stem));
    }

    #[test]
    fn unrelated_paths_do_not_match() {
        let catalog = KeywordCatalog::builtin();
        assert!(!catalog.matches_cookie("https://example.test/contact"));
        assert!(!catalog.matches_privacy("https://example.test/jobs"));
    }
}
