//! Identifiers for projects, steps and their diagnostics.
//!
//! Every table keys its rows by one of these, so a step id cannot be
//! handed to a query that expects a project id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// Each listed name becomes a `Copy` wrapper around a v4 UUID. The text
// form is the hyphenated UUID, both in SQLite columns and in JSON.
macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0, f)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    Uuid::parse_str(s).map(Self)
                }
            }

            // Row decoding goes through the raw UUID.
            impl From<Uuid> for $name {
                fn from(uuid: Uuid) -> Self {
                    Self(uuid)
                }
            }
        )+
    };
}

typed_id! {
    /// Unique identifier for an upload project.
    ProjectId,
    /// Unique identifier for one step of a project.
    StepId,
    /// Unique identifier for a warning raised by a step.
    WarningId,
    /// Unique identifier for an error recorded against a step.
    StepErrorId,
}
