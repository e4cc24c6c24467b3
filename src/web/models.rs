use serde::{Deserialize, Serialize};

/// Envelope for single-value responses: `{"value": ..., "error": null}`.
#[derive(Serialize, Debug)]
pub struct ValueResponse<T> {
    pub value: T,
    pub error: Option<String>,
}

impl<T> ValueResponse<T> {
    pub fn ok(value: T) -> Self {
        Self { value, error: None }
    }
}

/// Envelope for listings: `{"values": [...], "error": null}`.
#[derive(Serialize, Debug)]
pub struct ValuesResponse<T> {
    pub values: Vec<T>,
    pub error: Option<String>,
    /// Items left out because they failed individually.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl<T> ValuesResponse<T> {
    pub fn ok(values: Vec<T>) -> Self {
        Self {
            values,
            error: None,
            skipped: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MakeDirRequest {
    #[serde(default)]
    pub path: String,
    pub name: String,
}
