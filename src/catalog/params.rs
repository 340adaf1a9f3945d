use super::entities::FilterKind;
use super::validation::{ValidationError, ValidationResult};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_LIMIT: usize = 5;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Raw list arguments, as they would arrive in a query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub filters: BTreeMap<String, String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        PageLimits {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

impl PageLimits {
    /// `(limit, offset)` clamped into range. Out-of-range values are never
    /// rejected.
    pub fn clamp(&self, limit: Option<i64>, offset: Option<i64>) -> (usize, usize) {
        let max_limit = self.max_limit.max(1);
        let limit = match limit {
            None => self.default_limit.clamp(1, max_limit),
            Some(l) => (l.max(1) as u64).min(max_limit as u64) as usize,
        };
        let offset = offset.unwrap_or(0).max(0) as usize;
        (limit, offset)
    }
}

/// A recognised filter, parsed into the value stored in documents.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilter {
    pub key: &'static str,
    pub kind: FilterKind,
    pub value: Value,
}

/// Keeps only the keys in `accepted`, parsing each value by its kind.
pub fn parse_filters(
    filters: &BTreeMap<String, String>,
    accepted: &'static [(&'static str, FilterKind)],
) -> ValidationResult<Vec<ParsedFilter>> {
    let mut parsed = Vec::new();
    for (key, kind) in accepted {
        let Some(raw) = filters.get(*key) else {
            continue;
        };
        let invalid = || ValidationError::InvalidFilter {
            key: key.to_string(),
            value: raw.clone(),
        };
        let raw_trimmed = raw.trim();
        let value = match kind {
            FilterKind::Reference(_) => {
                if raw_trimmed.is_empty() {
                    return Err(invalid());
                }
                Value::from(raw_trimmed)
            }
            FilterKind::Count => Value::from(raw_trimmed.parse::<u32>().map_err(|_| invalid())?),
            FilterKind::Year => Value::from(raw_trimmed.parse::<i32>().map_err(|_| invalid())?),
            FilterKind::Flag => match raw_trimmed {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => return Err(invalid()),
            },
        };
        parsed.push(ParsedFilter {
            key: *key,
            kind: *kind,
            value,
        });
    }
    Ok(parsed)
}
