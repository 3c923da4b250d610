//! Accepted API breaks, the items most commonly accumulated per project.

use serde::{Deserialize, Serialize};

use crate::error::{AccrualError, Result};
use crate::key::GroupAndName;
use crate::per_project::PerProject;

/// Accepted breaks for every project.
pub type AcceptedBreaks = PerProject<AcceptedBreak>;

/// An API compatibility break that a project has chosen to accept.
///
/// `old` and `new` identify the element before and after the change; either
/// may be absent (for example when an element was added or removed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawAcceptedBreak")]
pub struct AcceptedBreak {
    /// Checker code for the kind of break, e.g. `java.method.removed`.
    pub code: String,
    /// Element before the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<String>,
    /// Element after the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<String>,
    /// Why the break is acceptable.
    pub justification: String,
}

/// Unvalidated wire form of [`AcceptedBreak`].
#[derive(Deserialize)]
struct RawAcceptedBreak {
    code: String,
    #[serde(default)]
    old: Option<String>,
    #[serde(default)]
    new: Option<String>,
    justification: String,
}

impl TryFrom<RawAcceptedBreak> for AcceptedBreak {
    type Error = AccrualError;

    fn try_from(raw: RawAcceptedBreak) -> Result<Self> {
        let mut accepted = AcceptedBreak::new(raw.code, raw.justification)?;
        accepted.old = raw.old;
        accepted.new = raw.new;
        Ok(accepted)
    }
}

impl AcceptedBreak {
    /// Create an accepted break with no old/new element.
    pub fn new(code: impl Into<String>, justification: impl Into<String>) -> Result<Self> {
        let code = code.into();
        let justification = justification.into();

        if code.trim().is_empty() {
            return Err(AccrualError::invalid_argument("break code must not be empty"));
        }
        if justification.trim().is_empty() {
            return Err(AccrualError::invalid_argument(format!(
                "justification for {} must not be empty",
                code
            )));
        }

        Ok(Self {
            code,
            old: None,
            new: None,
            justification,
        })
    }

    pub fn with_old(mut self, old: impl Into<String>) -> Self {
        self.old = Some(old.into());
        self
    }

    pub fn with_new(mut self, new: impl Into<String>) -> Self {
        self.new = Some(new.into());
        self
    }

    /// Whether this break is the same change as `other`, ignoring the
    /// justification.
    pub fn same_change(&self, other: &AcceptedBreak) -> bool {
        self.code == other.code && self.old == other.old && self.new == other.new
    }
}

/// Whether `accepted` already covers a break with the same code and elements
/// for `key`, regardless of justification.
pub fn is_accepted(
    accepted: &AcceptedBreaks,
    key: &GroupAndName,
    candidate: &AcceptedBreak,
) -> bool {
    accepted
        .for_key(key)
        .iter()
        .any(|existing| existing.same_change(candidate))
}
