use serde::{Deserialize, Deserializer, Serialize};

/// The role applicants are scored against.
///
/// Requirement lists are ordered by authoring priority. A list may be empty,
/// but a `null` or missing list in the input is normalised to empty so that
/// downstream code never has to distinguish the two.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpecification {
    pub title: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable_list")]
    pub required_experience: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub required_education: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub required_duties: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub nice_to_have_experience: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub nice_to_have_education: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub nice_to_have_duties: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum JobSpecError {
    #[error("job description is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("job description has an empty title")]
    MissingTitle,
}

impl JobSpecification {
    /// Parses a job specification from its JSON form.
    pub fn from_json(raw: &str) -> Result<Self, JobSpecError> {
        let spec: JobSpecification = serde_json::from_str(raw)?;
        if spec.title.trim().is_empty() {
            return Err(JobSpecError::MissingTitle);
        }
        Ok(spec)
    }
}

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
