use chrono::Local;
use serde::{Deserialize, Serialize};

/// Severity of a key finding, as produced by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

/// Position of a test result relative to its reference range. Trusted as
/// returned by the model, never cross-checked against the result value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Normal,
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFinding {
    pub severity: Severity,
    pub icon: String,
    pub color: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_name: String,
    pub result: String,
    pub reference_range: String,
    pub status: TestStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    pub purpose: String,
}

/// Structured findings extracted from one uploaded report. Created once per
/// request, returned to the caller, and not retained server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAnalysis {
    pub patient_name: String,
    pub report_date: String,
    pub report_type: String,
    #[serde(default)]
    pub key_findings: Vec<KeyFinding>,
    #[serde(default)]
    pub test_results: Vec<TestResult>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub questions: Vec<String>,
    pub summary: String,
}

impl ReportAnalysis {
    /// Fixed placeholder analysis returned when the model's reply cannot be
    /// parsed. Still travels in a success envelope so the UI stays usable.
    pub fn fallback() -> Self {
        ReportAnalysis {
            patient_name: "Sample Patient".to_string(),
            report_date: Local::now().format("%-m/%-d/%Y").to_string(),
            report_type: "Medical Report".to_string(),
            key_findings: vec![KeyFinding {
                severity: Severity::Normal,
                icon: "check_circle".to_string(),
                color: "primary".to_string(),
                description: "Unable to extract detailed findings from the image. \
                              Please ensure the image is clear and readable."
                    .to_string(),
            }],
            test_results: Vec::new(),
            medications: Vec::new(),
            questions: vec![
                "Could you provide a clearer image of the report?".to_string(),
                "Are there any specific values you'd like me to explain?".to_string(),
            ],
            summary: "The AI had difficulty reading the report. Please try uploading \
                      a clearer image or contact support."
                .to_string(),
        }
    }
}

/// Success envelope for the analyze endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReply {
    pub success: bool,
    pub file_name: String,
    pub file_size: u64,
    pub analysis: ReportAnalysis,
}
