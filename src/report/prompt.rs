//! Prompt construction for report generation.
//!
//! The section markers here must stay in sync with the parser in the parent
//! module: the model is told to answer under `## HEADING` markers and to
//! write "Not specified" instead of guessing.

/// Builds the structured medical-report prompt for a transcript.
pub fn medical_report_prompt(transcript: &str) -> String {
    format!(
        "You are an expert medical assistant tasked with analyzing a doctor-patient \
conversation transcript and creating a structured medical report.

TRANSCRIPT:
{transcript}

Provide a comprehensive analysis in exactly the following structured format:

## PATIENT DETAILS
Name, age, gender, and contact information if mentioned.

## CHIEF COMPLAINT
The main concern or symptom that brought the patient to the doctor.

## SYMPTOMS
All symptoms mentioned, with duration, severity, and associated symptoms.

## MEDICAL HISTORY
Previous illnesses, surgeries, current medications, allergies, and relevant \
family or social history.

## PHYSICAL EXAMINATION
Vital signs, examination findings, and any diagnostic tests discussed.

## ASSESSMENT
Primary diagnosis, differential diagnoses, and the clinical impression.

## PLAN
Treatment plan, prescribed medications, follow-up instructions, lifestyle \
recommendations, and patient education.

## NOTES
Any additional important information or observations from the conversation.

Extract information accurately from the transcript only. If certain \
information is not available, write \"Not specified\" rather than making \
assumptions. Use clear, professional medical language."
    )
}

/// Builds the free-text AI assessment prompt for a transcript.
pub fn assessment_prompt(transcript: &str) -> String {
    format!(
        "You are an advanced AI medical diagnostic assistant. Analyze the following \
doctor-patient conversation transcript and provide a comprehensive medical \
assessment.

TRANSCRIPT:
{transcript}

Cover, with clear headings and bullet points:
- Symptom analysis: categorize symptoms, patterns, severity, and red flags.
- Differential diagnosis: possible conditions ranked by likelihood with brief \
reasoning.
- Severity assessment: urgency level (routine/urgent/emergency) and risk factors.
- Recommended next steps: immediate actions, diagnostic tests, and referrals.
- Warning signs: symptoms that would require immediate medical attention.
- Treatment considerations: general approaches and lifestyle modifications.
- Confidence assessment: how confident this analysis is and its limitations.

This assessment is for educational and reference purposes only; emphasize the \
need for professional medical evaluation. Do not provide specific medication \
dosages or definitive diagnoses."
    )
}
