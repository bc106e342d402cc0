use serde::{Deserialize, Serialize};

/// An indexed unit of the deck. Slides are immutable inputs to the export
/// pipeline — they come from the (out of scope) slide parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slide {
    /// 1-based ordinal over the entire deck.
    pub index: u32,
    pub title: Option<String>,
    /// Speaker-notes text, if any.
    pub note: Option<String>,
    #[serde(default)]
    pub frontmatter: Frontmatter,
    /// Nesting depth for TOC construction; 1 for a top-level title.
    #[serde(default = "default_title_level")]
    pub title_level: u32,
    /// Total number of reveal clicks on this slide (0 if none).
    #[serde(default)]
    pub clicks_total: u32,
}

fn default_title_level() -> u32 {
    1
}

/// Recognized frontmatter keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frontmatter {
    pub author: Option<String>,
    pub info: Option<String>,
    /// Either a comma-separated scalar or an explicit list; normalized to a
    /// list by [`Frontmatter::keywords_list`].
    #[serde(default)]
    pub keywords: Option<KeywordsValue>,
    #[serde(rename = "hideInToc", default)]
    pub hide_in_toc: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeywordsValue {
    Scalar(String),
    List(Vec<String>),
}

impl Frontmatter {
    /// Splits a scalar keyword string on `,` per spec.md §4.D; a list value
    /// is returned unchanged.
    pub fn keywords_list(&self) -> Vec<String> {
        match &self.keywords {
            None => Vec::new(),
            Some(KeywordsValue::List(v)) => v.clone(),
            Some(KeywordsValue::Scalar(s)) => s
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_scalar_splits_on_comma() {
        let fm = Frontmatter {
            keywords: Some(KeywordsValue::Scalar("rust, export , video".into())),
            ..Default::default()
        };
        assert_eq!(fm.keywords_list(), vec!["rust", "export", "video"]);
    }

    #[test]
    fn keywords_list_passes_through() {
        let fm = Frontmatter {
            keywords: Some(KeywordsValue::List(vec!["a".into(), "b".into()])),
            ..Default::default()
        };
        assert_eq!(fm.keywords_list(), vec!["a", "b"]);
    }

    #[test]
    fn keywords_absent_is_empty() {
        assert!(Frontmatter::default().keywords_list().is_empty());
    }
}
