//! Route pattern matching
//!
//! Page paths registered in the store may contain `:param` segments
//! (`/domains/:slug/concepts`), each matching exactly one non-empty path
//! segment. An exact path always beats a pattern.

use crate::error::ConfigError;
use regex::Regex;

/// One compiled page path
#[derive(Debug)]
pub struct RoutePattern {
    source: String,
    regex: Option<Regex>,
}

impl RoutePattern {
    /// Compile a page path. Paths without `:` segments match literally.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        if !path.contains(':') {
            return Ok(Self {
                source: path.to_string(),
                regex: None,
            });
        }

        let body = path
            .split('/')
            .map(|segment| {
                if is_param(segment) {
                    "[^/]+".to_string()
                } else {
                    regex::escape(segment)
                }
            })
            .collect::<Vec<_>>()
            .join("/");

        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| {
            ConfigError::InvalidPattern {
                pattern: path.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            source: path.to_string(),
            regex: Some(regex),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_parameterized(&self) -> bool {
        self.regex.is_some()
    }

    pub fn matches(&self, path: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(path),
            None => self.source == path,
        }
    }
}

fn is_param(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with(':')
        && segment[1..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A set of page paths, resolved exact-first
#[derive(Debug, Default)]
pub struct RouteTable {
    patterns: Vec<RoutePattern>,
}

impl RouteTable {
    pub fn new<S: AsRef<str>>(paths: &[S]) -> Result<Self, ConfigError> {
        let patterns = paths
            .iter()
            .map(|p| RoutePattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Find the page path governing `path`, returning its source text
    pub fn find_match(&self, path: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| !p.is_parameterized() && p.matches(path))
            .or_else(|| {
                self.patterns
                    .iter()
                    .find(|p| p.is_parameterized() && p.matches(path))
            })
            .map(RoutePattern::source)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}
