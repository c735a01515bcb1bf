//! Recognition endpoint response shapes

use serde::Deserialize;

/// Status value that marks a legacy response as successful
const LEGACY_OK_STATUS: i64 = 200;

#[derive(Debug, Default, Deserialize)]
struct RawResponse {
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    result: Option<Vec<String>>,
    #[serde(default)]
    results: Option<Vec<ModernResult>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModernResult {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub transcript: String,
}

/// A recognition response, classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionResponse {
    /// `{"status": 200, "result": ["text", ...]}`
    Legacy(Vec<String>),
    /// `{"results": [{"alternatives": [{"transcript": "text"}]}]}`
    Modern(Vec<ModernResult>),
    /// Valid JSON object matching neither shape
    Unrecognized,
}

impl RecognitionResponse {
    /// Parse a response body. The legacy shape takes precedence over the modern one.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        let raw: RawResponse = serde_json::from_str(body)?;
        Ok(Self::classify(raw))
    }

    fn classify(raw: RawResponse) -> Self {
        match raw {
            RawResponse {
                status: Some(LEGACY_OK_STATUS),
                result: Some(result),
                ..
            } if !result.is_empty() => RecognitionResponse::Legacy(result),
            RawResponse {
                results: Some(results),
                ..
            } if !results.is_empty() => RecognitionResponse::Modern(results),
            _ => RecognitionResponse::Unrecognized,
        }
    }

    /// Recognized text, empty when the response carries none
    pub fn into_text(self) -> String {
        match self {
            RecognitionResponse::Legacy(result) => result.into_iter().next().unwrap_or_default(),
            RecognitionResponse::Modern(results) => results
                .into_iter()
                .next()
                .and_then(|r| r.alternatives.into_iter().next())
                .map(|a| a.transcript)
                .unwrap_or_default(),
            RecognitionResponse::Unrecognized => String::new(),
        }
    }
}
