//! Splitting of a delimited literal into fragments.

use crate::consts::COMMA_BEFORE_QUOTE;
use crate::errors::InvalidDelimiterError;
use anyhow::Result;
use regex::Regex;

/// A compiled split delimiter.
#[derive(Debug, Clone)]
pub enum Delimiter {
    /// Split on every match of the pattern, consuming the match.
    Pattern(Regex),
    /// Split on a comma only when it is immediately followed by `"`; the quote is kept.
    CommaBeforeQuote(Regex),
}

impl Delimiter {
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(InvalidDelimiterError {
                delimiter: text.to_string(),
                reason: "delimiter must not be empty".to_string(),
            }
            .into());
        }
        let compiled = Regex::new(text).map_err(|e| InvalidDelimiterError {
            delimiter: text.to_string(),
            reason: e.to_string(),
        })?;
        if text == COMMA_BEFORE_QUOTE {
            Ok(Delimiter::CommaBeforeQuote(compiled))
        } else {
            Ok(Delimiter::Pattern(compiled))
        }
    }

    /// The regex a store uses to select values containing this delimiter.
    pub fn filter_pattern(&self) -> &str {
        match self {
            Delimiter::Pattern(re) | Delimiter::CommaBeforeQuote(re) => re.as_str(),
        }
    }

    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Delimiter::Pattern(re) | Delimiter::CommaBeforeQuote(re) => re.is_match(value),
        }
    }

    /// Byte ranges removed between fragments.
    fn cuts<'a>(&'a self, value: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
        let (re, keep_tail) = match self {
            Delimiter::Pattern(re) => (re, false),
            Delimiter::CommaBeforeQuote(re) => (re, true),
        };
        re.find_iter(value).map(move |m| {
            if keep_tail {
                // only the comma is consumed
                (m.start(), m.start() + 1)
            } else {
                (m.start(), m.end())
            }
        })
    }
}

/// Splits values on a delimiter and trims an optional boundary token from each fragment.
#[derive(Debug, Clone)]
pub struct FragmentSplitter {
    delimiter: Delimiter,
    trim: Option<String>,
}

impl FragmentSplitter {
    pub fn new(delimiter: Delimiter, trim: Option<String>) -> Self {
        let trim = trim.filter(|t| !t.is_empty());
        Self { delimiter, trim }
    }

    pub fn delimiter(&self) -> &Delimiter {
        &self.delimiter
    }

    /// Returns the fragments of `value` in left-to-right order. Empty fragments are kept.
    ///
    /// The returned iterator is `Clone`, so iteration can be restarted from any point.
    pub fn split<'a>(&'a self, value: &'a str) -> Fragments<'a> {
        let mut bounds = Vec::new();
        let mut start = 0;
        for (cut_start, cut_end) in self.delimiter.cuts(value) {
            // zero-width matches at the start would produce a spurious empty head
            if cut_end == 0 {
                continue;
            }
            bounds.push((start, cut_start));
            start = cut_end;
        }
        bounds.push((start, value.len()));
        Fragments {
            value,
            trim: self.trim.as_deref(),
            bounds,
            pos: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fragments<'a> {
    value: &'a str,
    trim: Option<&'a str>,
    bounds: Vec<(usize, usize)>,
    pos: usize,
}

impl<'a> Iterator for Fragments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let (start, end) = *self.bounds.get(self.pos)?;
        self.pos += 1;
        let fragment = &self.value[start..end];
        Some(match self.trim {
            Some(token) => trim_once(fragment, token),
            None => fragment,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.bounds.len() - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Fragments<'_> {}

/// Strips one leading and one trailing occurrence of `token`.
pub fn trim_once<'a>(fragment: &'a str, token: &str) -> &'a str {
    let fragment = fragment.strip_prefix(token).unwrap_or(fragment);
    fragment.strip_suffix(token).unwrap_or(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(delimiter: &str, trim: Option<&str>) -> FragmentSplitter {
        FragmentSplitter::new(
            Delimiter::parse(delimiter).unwrap(),
            trim.map(str::to_string),
        )
    }

    #[test]
    fn test_split_on_regex() {
        let s = splitter(r"\s*;\s*", None);
        let parts: Vec<&str> = s.split("a ; b;c").collect();
        assert_eq!(parts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_comma_before_quote_keeps_inner_commas() {
        let s = splitter(",\"", None);
        let parts: Vec<&str> = s.split("A, B,\"C, D\"").collect();
        assert_eq!(parts, vec!["A, B", "\"C, D\""]);
    }

    #[test]
    fn test_comma_before_quote_with_trim() {
        let s = splitter(",\"", Some("\""));
        let parts: Vec<&str> = s.split("\"x, y\",\"z\"").collect();
        assert_eq!(parts, vec!["x, y", "z"]);
    }

    #[test]
    fn test_empty_fragments_preserved() {
        let s = splitter(",", None);
        let parts: Vec<&str> = s.split("a,,b,").collect();
        assert_eq!(parts, vec!["a", "", "b", ""]);
    }

    #[test]
    fn test_zero_width_match_at_end_keeps_empty_tail() {
        let s = splitter(r"\b", None);
        let parts: Vec<&str> = s.split("ab").collect();
        assert_eq!(parts, vec!["ab", ""]);
    }

    #[test]
    fn test_trim_is_single_pass() {
        assert_eq!(trim_once("''a''", "'"), "'a'");
        assert_eq!(trim_once("a", "'"), "a");
        assert_eq!(trim_once("'", "'"), "");
    }

    #[test]
    fn test_fragments_restartable() {
        let s = splitter("\\|", None);
        let mut it = s.split("a|b|c");
        assert_eq!(it.next(), Some("a"));
        let snapshot = it.clone();
        assert_eq!(it.collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(s.split("a|b|c").count(), 3);
    }

    #[test]
    fn test_invalid_delimiter() {
        let err = Delimiter::parse("(").unwrap_err();
        assert!(err.downcast_ref::<InvalidDelimiterError>().is_some());
        assert!(Delimiter::parse("").is_err());
    }

    #[test]
    fn test_filter_pattern() {
        assert_eq!(Delimiter::parse(",\"").unwrap().filter_pattern(), ",\"");
        assert!(Delimiter::parse(",").unwrap().is_match("a,b"));
        assert!(!Delimiter::parse(",").unwrap().is_match("ab"));
    }
}
