use serde::{Deserialize, Serialize};

use crate::error::ExportError;

/// An ordered, non-empty sequence of slide indices. Construction is the
/// boundary at which the "empty range is invalid" invariant is enforced.
///
/// The deeper semantics of a range *expression* (e.g. resolving it against a
/// deck's actual slide count/metadata) are an external collaborator's job
/// per spec.md §1; [`Range::parse`] only does the syntactic `"1-3,5"` ->
/// `[1,2,3,5]` expansion needed to cross the HTTP boundary into this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range(Vec<u32>);

impl Range {
    pub fn new(indices: Vec<u32>) -> Result<Self, ExportError> {
        if indices.is_empty() {
            return Err(ExportError::Input("range must not be empty".into()));
        }
        Ok(Self(indices))
    }

    /// Parses a range expression: comma-separated slide numbers and/or
    /// dash-joined inclusive spans, e.g. `"1-3,5"` -> `[1, 2, 3, 5]`.
    pub fn parse(expr: &str) -> Result<Self, ExportError> {
        let mut indices = Vec::new();
        for part in expr.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once('-') {
                Some((start, end)) => {
                    let start: u32 = start
                        .trim()
                        .parse()
                        .map_err(|_| ExportError::Input(format!("invalid range {expr:?}")))?;
                    let end: u32 = end
                        .trim()
                        .parse()
                        .map_err(|_| ExportError::Input(format!("invalid range {expr:?}")))?;
                    if end < start {
                        return Err(ExportError::Input(format!("invalid range {expr:?}")));
                    }
                    indices.extend(start..=end);
                }
                None => {
                    let n: u32 = part.parse().map_err(|_| ExportError::Input(format!("invalid range {expr:?}")))?;
                    indices.push(n);
                }
            }
        }
        Self::new(indices)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn first(&self) -> u32 {
        self.0[0]
    }

    pub fn last(&self) -> u32 {
        self.0[self.0.len() - 1]
    }

    /// Each element is the previous plus one.
    pub fn is_contiguous(&self) -> bool {
        self.0.windows(2).all(|pair| pair[1] == pair[0] + 1)
    }
}

/// The pair that uniquely identifies a reveal state on a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepKey {
    pub no: u32,
    pub clicks: u32,
}

impl StepKey {
    pub fn new(no: u32, clicks: u32) -> Self {
        Self { no, clicks }
    }
}

impl std::fmt::Display for StepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.no, self.clicks)
    }
}

/// The in-page playback state, as read from the step bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    pub no: u32,
    pub clicks: u32,
    #[serde(rename = "clicksTotal")]
    pub clicks_total: u32,
    #[serde(rename = "hasNext")]
    pub has_next: bool,
}

impl StepInfo {
    pub fn key(&self) -> StepKey {
        StepKey::new(self.no, self.clicks)
    }

    /// Whether this step is at or past the given end-of-range step.
    pub fn at_or_past(&self, end_slide_no: u32) -> bool {
        self.no > end_slide_no || (self.no == end_slide_no && self.clicks >= self.clicks_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_range_is_rejected() {
        assert!(Range::new(vec![]).is_err());
    }

    #[test]
    fn parse_expands_dash_span() {
        let r = Range::parse("2-4").unwrap();
        assert_eq!(r.as_slice(), &[2, 3, 4]);
    }

    #[test]
    fn parse_expands_mixed_commas_and_spans() {
        let r = Range::parse("1-3,5").unwrap();
        assert_eq!(r.as_slice(), &[1, 2, 3, 5]);
    }

    #[test]
    fn parse_rejects_backwards_span() {
        assert!(Range::parse("5-2").is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Range::parse("a,b").is_err());
    }

    #[test]
    fn parse_rejects_empty_expression() {
        assert!(Range::parse("").is_err());
    }

    #[test]
    fn contiguous_range_detected() {
        let r = Range::new(vec![2, 3, 4]).unwrap();
        assert!(r.is_contiguous());
    }

    #[test]
    fn non_contiguous_range_detected() {
        let r = Range::new(vec![1, 3]).unwrap();
        assert!(!r.is_contiguous());
    }

    #[test]
    fn single_element_range_is_contiguous() {
        let r = Range::new(vec![5]).unwrap();
        assert!(r.is_contiguous());
    }

    #[test]
    fn step_at_or_past_end() {
        let info = StepInfo { no: 4, clicks: 2, clicks_total: 2, has_next: true };
        assert!(info.at_or_past(4));
        assert!(info.at_or_past(3));
        let earlier = StepInfo { no: 2, clicks: 0, clicks_total: 2, has_next: true };
        assert!(!earlier.at_or_past(4));
    }
}
