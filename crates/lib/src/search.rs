use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tag metadata field a search clause matches against.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchField {
    Name,
    Description,
    Units,
}

/// How multiple clauses combine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClauseJoin {
    And,
    Or,
}

/// One wildcard clause: `*` matches any substring, `?` one character,
/// everything else is literal. Matching is case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchClause {
    pub field: SearchField,
    pub pattern: String,
}

impl SearchClause {
    pub fn new(field: SearchField, pattern: impl Into<String>) -> Self {
        SearchClause {
            field,
            pattern: pattern.into(),
        }
    }
}

/// Paged tag search. Pages are 1-based; results are ordered by tag name
/// (case-insensitively) before slicing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSearchFilter {
    pub page: usize,
    pub page_size: usize,
    pub clauses: Vec<SearchClause>,
    pub join: ClauseJoin,
}

impl Default for TagSearchFilter {
    fn default() -> Self {
        TagSearchFilter {
            page: 1,
            page_size: 50,
            clauses: Vec::new(),
            join: ClauseJoin::And,
        }
    }
}

impl TagSearchFilter {
    pub fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(Error::invalid("page numbers are 1-based"));
        }
        if self.page_size < 1 {
            return Err(Error::invalid("page size must be at least 1"));
        }
        Ok(())
    }

    /// Whether a tag with the given metadata matches this filter. A filter
    /// with no clauses matches everything.
    pub fn matches(&self, name: &str, description: &str, units: &str) -> Result<bool> {
        if self.clauses.is_empty() {
            return Ok(true);
        }
        let mut any = false;
        for clause in &self.clauses {
            let subject = match clause.field {
                SearchField::Name => name,
                SearchField::Description => description,
                SearchField::Units => units,
            };
            let hit = wildcard_regex(&clause.pattern)?.is_match(subject);
            match self.join {
                ClauseJoin::And if !hit => return Ok(false),
                ClauseJoin::Or if hit => any = true,
                _ => {}
            }
        }
        Ok(match self.join {
            ClauseJoin::And => true,
            ClauseJoin::Or => any,
        })
    }

    /// The `(page-1)*page_size .. page*page_size` slice bounds.
    pub fn slice_bounds(&self) -> (usize, usize) {
        let start = (self.page - 1).saturating_mul(self.page_size);
        (start, start.saturating_add(self.page_size))
    }
}

/// Compiles a wildcard pattern into an anchored, case-insensitive regex.
/// Only `*` and `?` are special; all regex metacharacters are literal.
pub fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push_str("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            ch => {
                let mut buf = [0u8; 4];
                expr.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
            }
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| Error::invalid(format!("bad search pattern `{pattern}`: {e}")))
}
