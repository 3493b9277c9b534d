use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StudentPayload {
    #[serde(default)]
    pub(crate) id: Option<i64>,
    pub(crate) roll_no: String,
    pub(crate) full_name: String,
    pub(crate) email: String,
    #[serde(default)]
    pub(crate) cgpa: Option<f64>,
    #[serde(default)]
    pub(crate) tenth_percentage: Option<f64>,
    #[serde(default)]
    pub(crate) twelfth_percentage: Option<f64>,
    #[serde(default)]
    pub(crate) result: Option<ResultPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultPayload {
    #[serde(default)]
    pub(crate) score: Option<f64>,
    #[serde(default)]
    pub(crate) time_taken: Option<i64>,
    #[serde(default)]
    pub(crate) submitted_at: Option<String>,
}
