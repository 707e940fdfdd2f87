use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub summarizer: &'static str,
    pub extractor: String,
}
