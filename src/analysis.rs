use tracing::error;

use crate::models::ReportAnalysis;

/// Instruction sent to the model alongside the encoded report. The embedded
/// example doubles as a formatting guide; the model is told to reply with the
/// JSON object and nothing else.
pub const ANALYSIS_PROMPT: &str = r#"You are a medical assistant AI. Analyze the medical report in the image/document provided and provide a comprehensive summary in the following JSON format:

{
  "patientName": "Alex Rivera",
  "reportDate": "2024-01-15",
  "reportType": "Blood Test Summary",
  "keyFindings": [
    {
      "severity": "warning",
      "icon": "info",
      "color": "amber-500",
      "description": "Vitamin D levels are slightly below optimal range, which could contribute to fatigue."
    },
    {
      "severity": "critical",
      "icon": "warning",
      "color": "red-500",
      "description": "Hemoglobin is low (11.2 g/dL), suggesting mild anemia that may cause tiredness."
    },
    {
      "severity": "normal",
      "icon": "check_circle",
      "color": "primary",
      "description": "Cholesterol and WBC counts are within healthy ranges."
    }
  ],
  "testResults": [
    {
      "testName": "Hemoglobin (Hb)",
      "result": "11.2 g/dL",
      "referenceRange": "13.5 - 17.5 g/dL",
      "status": "low"
    },
    {
      "testName": "WBC Count",
      "result": "7.4 x10^9/L",
      "referenceRange": "4.5 - 11.0 x10^9/L",
      "status": "normal"
    },
    {
      "testName": "Vitamin D, 25-OH",
      "result": "22 ng/mL",
      "referenceRange": "30 - 100 ng/mL",
      "status": "low"
    }
  ],
  "medications": [
    {
      "name": "Vitamin D3 (2000 IU)",
      "dosage": "Daily",
      "purpose": "To normalize vitamin D levels and reduce fatigue."
    },
    {
      "name": "Ferrous Sulfate",
      "dosage": "As prescribed",
      "purpose": "Iron supplement to address mild anemia."
    }
  ],
  "questions": [
    "Is my anemia diet-related or due to another underlying cause?",
    "When should I retest my Vitamin D levels?",
    "What iron-rich foods should I prioritize in my meals?"
  ],
  "summary": "The report shows some areas needing attention, particularly low Vitamin D and Hemoglobin levels, while cholesterol and WBC counts are healthy."
}

Generate a similar comprehensive medical report analysis. Respond ONLY with the JSON object, no other text."#;

/// Result of decoding one model reply. `fallback` is diagnostic only; it never
/// changes the wire envelope, which reports success either way.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: ReportAnalysis,
    pub fallback: bool,
}

/// Remove a leading ``` or ```json fence and a trailing ``` fence. Models
/// wrap JSON replies in markdown fences often enough that this is worth doing
/// unconditionally; the inner bytes are left untouched.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_prefix = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let without_suffix = without_prefix
        .strip_suffix("```")
        .unwrap_or(without_prefix);
    without_suffix.trim()
}

/// Decode the model's raw text reply. Any failure to parse — malformed JSON,
/// unexpected shape, empty reply — is swallowed: the raw text is logged and a
/// fixed fallback analysis is substituted so the caller still gets a usable
/// (if generic) result.
pub fn parse_analysis(raw: &str) -> AnalysisOutcome {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<ReportAnalysis>(cleaned) {
        Ok(analysis) => AnalysisOutcome {
            analysis,
            fallback: false,
        },
        Err(e) => {
            error!("Failed to parse model response as JSON: {} (raw: {:?})", e, raw);
            AnalysisOutcome {
                analysis: ReportAnalysis::fallback(),
                fallback: true,
            }
        }
    }
}
