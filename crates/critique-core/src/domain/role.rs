//! The closed set of pipeline roles.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CritiqueError;

/// One stage of the critique-refinement pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleName {
    Summarizer,
    Rebuttal,
    Judge,
    /// Produces the gradient for the next iteration. Older configs call it `textgrad`.
    #[serde(alias = "textgrad")]
    Feedback,
}

impl RoleName {
    /// All roles, in pipeline order.
    pub const ALL: [RoleName; 4] = [
        RoleName::Summarizer,
        RoleName::Rebuttal,
        RoleName::Judge,
        RoleName::Feedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Summarizer => "summarizer",
            RoleName::Rebuttal => "rebuttal",
            RoleName::Judge => "judge",
            RoleName::Feedback => "feedback",
        }
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = CritiqueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summarizer" => Ok(RoleName::Summarizer),
            "rebuttal" => Ok(RoleName::Rebuttal),
            "judge" => Ok(RoleName::Judge),
            "feedback" | "textgrad" => Ok(RoleName::Feedback),
            other => Err(CritiqueError::UnknownRole(other.to_string())),
        }
    }
}
