//! Affix pattern parsing.
//!
//! A query string is `<keyPattern>[=<valuePattern>]`, split on the first
//! `=`. Each side is one of five shapes: exact (`X`), prefix (`X*`),
//! suffix (`*X`), infix (`*X*`, length > 2) or wildcard (`*`). A missing
//! value pattern defaults to `*`.

/// One of the five affix shapes, with the pattern's literal token (the
/// wildcard markers stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffixPattern {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Infix(String),
    Wildcard,
}

impl AffixPattern {
    /// Classifies a single pattern. `**` is treated as `*`.
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" || pattern == "**" {
            return AffixPattern::Wildcard;
        }

        let starts = pattern.starts_with('*');
        let ends = pattern.ends_with('*');

        if starts && ends && pattern.chars().count() > 2 {
            AffixPattern::Infix(pattern[1..pattern.len() - 1].to_string())
        } else if starts {
            AffixPattern::Suffix(pattern[1..].to_string())
        } else if ends {
            AffixPattern::Prefix(pattern[..pattern.len() - 1].to_string())
        } else {
            AffixPattern::Exact(pattern.to_string())
        }
    }

    /// The pattern token without wildcard markers; empty for wildcards.
    pub fn token(&self) -> &str {
        match self {
            AffixPattern::Exact(t)
            | AffixPattern::Prefix(t)
            | AffixPattern::Suffix(t)
            | AffixPattern::Infix(t) => t,
            AffixPattern::Wildcard => "",
        }
    }

    /// Brute-force check of this pattern against a candidate string.
    /// The reference semantics the trie-based searches must agree with.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            AffixPattern::Exact(t) => candidate == t,
            AffixPattern::Prefix(t) => candidate.starts_with(t.as_str()),
            AffixPattern::Suffix(t) => candidate.ends_with(t.as_str()),
            AffixPattern::Infix(t) => candidate.contains(t.as_str()),
            AffixPattern::Wildcard => true,
        }
    }
}

/// Splits a query into its key and value patterns. Without a `=` the whole
/// string is the key pattern and the value pattern defaults to `*`.
pub fn split_query(query: &str) -> (String, String) {
    match query.split_once('=') {
        Some((key, value)) => (key.to_string(), value.to_string()),
        None => (query.to_string(), "*".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shapes() {
        assert_eq!(AffixPattern::parse("*"), AffixPattern::Wildcard);
        assert_eq!(AffixPattern::parse("**"), AffixPattern::Wildcard);
        assert_eq!(
            AffixPattern::parse("Stage*"),
            AffixPattern::Prefix("Stage".into())
        );
        assert_eq!(
            AffixPattern::parse("*PATH"),
            AffixPattern::Suffix("PATH".into())
        );
        assert_eq!(
            AffixPattern::parse("*FILE*"),
            AffixPattern::Infix("FILE".into())
        );
        assert_eq!(
            AffixPattern::parse("StageX"),
            AffixPattern::Exact("StageX".into())
        );
        // Three characters is the shortest possible infix pattern.
        assert_eq!(AffixPattern::parse("*a*"), AffixPattern::Infix("a".into()));
    }

    #[test]
    fn test_split_query() {
        assert_eq!(
            split_query("StageX=300.00"),
            ("StageX".into(), "300.00".into())
        );
        assert_eq!(split_query("StageX"), ("StageX".into(), "*".into()));
        // Only the first '=' splits; the rest belongs to the value.
        assert_eq!(split_query("k=a=b"), ("k".into(), "a=b".into()));
    }

    #[test]
    fn test_brute_force_matches() {
        assert!(AffixPattern::parse("Stage*").matches("StageX"));
        assert!(!AffixPattern::parse("Stage*").matches("XStage"));
        assert!(AffixPattern::parse("*tif").matches("/data/488nm.tif"));
        assert!(AffixPattern::parse("*metadata*").matches("/data/488nm_metadata.json"));
        assert!(AffixPattern::parse("*").matches(""));
    }
}
