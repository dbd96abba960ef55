//! Structured medical reports generated from sealed transcripts.

pub mod generator;
pub mod model;
pub mod prompt;

pub use generator::{ReportGenerator, ReportGeneratorConfig};
pub use model::{GenerativeModel, MockGenerativeModel, VertexModel};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker used for sections the transcript gave no information about.
pub const NOT_SPECIFIED: &str = "Not specified";

/// The fixed section set of a generated report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSections {
    pub patient_details: String,
    pub chief_complaint: String,
    pub symptoms: String,
    pub medical_history: String,
    pub physical_examination: String,
    pub assessment: String,
    pub plan: String,
    pub notes: String,
}

impl Default for ReportSections {
    fn default() -> Self {
        let not_specified = || NOT_SPECIFIED.to_string();
        Self {
            patient_details: not_specified(),
            chief_complaint: not_specified(),
            symptoms: not_specified(),
            medical_history: not_specified(),
            physical_examination: not_specified(),
            assessment: not_specified(),
            plan: not_specified(),
            notes: not_specified(),
        }
    }
}

/// One generated report; an independent artifact from its conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalReport {
    pub conversation_id: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub sections: ReportSections,
    /// Unparsed model output, kept for display and export.
    pub raw_text: String,
}

/// Parses model output into the fixed section set.
///
/// The model is prompted to use `## HEADING` markers. Unknown headings are
/// folded into notes; headings the model skipped stay at "Not specified"
/// rather than failing the whole report.
pub fn parse_sections(text: &str) -> ReportSections {
    #[derive(Clone, Copy)]
    enum Section {
        PatientDetails,
        ChiefComplaint,
        Symptoms,
        MedicalHistory,
        PhysicalExamination,
        Assessment,
        Plan,
        Notes,
    }

    fn flush(
        sections: &mut ReportSections,
        section: Option<Section>,
        pending: &mut Vec<&str>,
    ) {
        if let Some(section) = section {
            let body = pending.join("\n").trim().to_string();
            if !body.is_empty() {
                let target = match section {
                    Section::PatientDetails => &mut sections.patient_details,
                    Section::ChiefComplaint => &mut sections.chief_complaint,
                    Section::Symptoms => &mut sections.symptoms,
                    Section::MedicalHistory => &mut sections.medical_history,
                    Section::PhysicalExamination => &mut sections.physical_examination,
                    Section::Assessment => &mut sections.assessment,
                    Section::Plan => &mut sections.plan,
                    Section::Notes => &mut sections.notes,
                };
                *target = body;
            }
        }
        pending.clear();
    }

    let mut sections = ReportSections::default();
    let mut current: Option<Section> = None;
    let mut pending: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("##") {
            flush(&mut sections, current.take(), &mut pending);
            let normalized = heading.trim_start_matches('#').trim().to_uppercase();
            current = Some(match normalized.as_str() {
                "PATIENT DETAILS" | "PATIENT INFORMATION" => Section::PatientDetails,
                "CHIEF COMPLAINT" => Section::ChiefComplaint,
                "SYMPTOMS" => Section::Symptoms,
                "MEDICAL HISTORY" | "PAST MEDICAL HISTORY" => Section::MedicalHistory,
                "PHYSICAL EXAMINATION" => Section::PhysicalExamination,
                "DOCTOR'S ASSESSMENT" | "ASSESSMENT" => Section::Assessment,
                "PLAN AND RECOMMENDATIONS" | "PLAN" => Section::Plan,
                _ => Section::Notes,
            });
        } else {
            pending.push(line);
        }
    }
    flush(&mut sections, current.take(), &mut pending);

    sections
}
