//! Lock identities and store key composition

use crate::error::{LockError, LockResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between key segments.
pub const KEY_DELIMITER: char = ':';

const ESCAPE: char = '\\';

/// A named lock: a category (family of resources) plus a field (one resource).
///
/// Both parts must contain non-whitespace text. The composed key escapes the
/// delimiter inside each part, so distinct identities never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockIdentity {
    category: String,
    field: String,
}

impl LockIdentity {
    /// Create a validated identity.
    ///
    /// ```
    /// use keylock_core::LockIdentity;
    ///
    /// let id = LockIdentity::new("STUDENT_LOCK", "123").unwrap();
    /// assert_eq!(id.key(), "STUDENT_LOCK:123");
    /// ```
    pub fn new(category: impl Into<String>, field: impl Into<String>) -> LockResult<Self> {
        let category = category.into();
        let field = field.into();

        if category.trim().is_empty() {
            return Err(LockError::invalid("lock category must not be blank"));
        }
        if field.trim().is_empty() {
            return Err(LockError::invalid("lock field must not be blank"));
        }

        Ok(Self { category, field })
    }

    /// Lock category
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Lock field
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Composed key without a namespace prefix: `<category>:<field>`.
    pub fn key(&self) -> String {
        let mut key = String::with_capacity(self.category.len() + self.field.len() + 1);
        push_escaped(&mut key, &self.category);
        key.push(KEY_DELIMITER);
        push_escaped(&mut key, &self.field);
        key
    }

    /// Composed key under an optional namespace prefix: `<prefix>:<category>:<field>`.
    ///
    /// The prefix is configuration, not user input, and is used verbatim.
    pub fn key_with_prefix(&self, prefix: Option<&str>) -> String {
        match prefix {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}{}{}", prefix, KEY_DELIMITER, self.key())
            }
            _ => self.key(),
        }
    }
}

impl fmt::Display for LockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

fn push_escaped(out: &mut String, part: &str) {
    for c in part.chars() {
        if c == ESCAPE || c == KEY_DELIMITER {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}
