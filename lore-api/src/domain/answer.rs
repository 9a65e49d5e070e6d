use serde::Serialize;
use uuid::Uuid;

/// A retrieved chunk cited in support of a generated answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub resource_id: Option<Uuid>,
    pub content: String,
    pub score: f64,
}

/// The final outcome of one ask: the generated answer plus the chunks it
/// was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub answer: String,
    pub references: Vec<Reference>,
}
