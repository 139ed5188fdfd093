//! Shared domain enumerations.

use serde::{Deserialize, Serialize};

/// Background job kinds; the string form doubles as the apalis queue name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Compute,
    InspectImage,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Compute => "compute",
            JobType::InspectImage => "inspect_image",
        }
    }
}

impl TryFrom<&str> for JobType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "compute" => Ok(JobType::Compute),
            "inspect_image" => Ok(JobType::InspectImage),
            _ => Err(()),
        }
    }
}
