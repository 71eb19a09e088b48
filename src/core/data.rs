use std::fmt::Write;

use crate::models::patient::PatientData;
use crate::models::resources::{CodeableConcept, Observation, Quantity};

const MAX_SUMMARY_VITALS: usize = 10;
const MAX_SUMMARY_LABS: usize = 10;
const MAX_SUMMARY_REPORTS: usize = 5;

fn concept_label(concept: Option<&CodeableConcept>, prefer_text: bool) -> &str {
    concept
        .and_then(|c| {
            if prefer_text {
                c.text_or_display()
            } else {
                c.display_or_text()
            }
        })
        .unwrap_or("Unknown")
}

fn quantity_value(quantity: &Quantity) -> String {
    let value = quantity.value.map(|v| v.to_string()).unwrap_or_default();
    format!("{} {}", value, quantity.unit.as_deref().unwrap_or(""))
        .trim_end()
        .to_string()
}

fn vital_value(obs: &Observation) -> String {
    if let Some(q) = &obs.value_quantity {
        return quantity_value(q);
    }
    if let Some(text) = &obs.value_string {
        return text.clone();
    }
    if let Some(components) = &obs.component {
        return components
            .iter()
            .map(|c| {
                let name = concept_label(c.code.as_ref(), false);
                let q = c.value_quantity.as_ref();
                format!(
                    "{}: {}{}",
                    name,
                    q.and_then(|q| q.value).map(|v| v.to_string()).unwrap_or_default(),
                    q.and_then(|q| q.unit.as_deref()).unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
    }
    "N/A".to_string()
}

fn lab_value(obs: &Observation) -> String {
    if let Some(q) = &obs.value_quantity {
        return quantity_value(q);
    }
    obs.value_codeable_concept
        .as_ref()
        .and_then(|c| c.text_or_display())
        .unwrap_or("N/A")
        .to_string()
}

/// Markdown-ish digest of a patient's chart for the LLM prompt.
///
/// Sections with no entries are left out entirely, so an empty chart yields
/// an empty string.
pub fn format_patient_data_for_ai(data: &PatientData) -> String {
    let mut out = String::new();

    if !data.vitals.is_empty() {
        out.push_str("## Vital Signs:\n");
        data.vitals
            .iter()
            .map(|e| &e.resource)
            .filter(|obs| obs.has_member.is_none() && obs.data_absent_reason.is_none())
            .take(MAX_SUMMARY_VITALS)
            .for_each(|obs| {
                let _ = writeln!(
                    out,
                    "- {}: {}",
                    concept_label(obs.code.as_ref(), false),
                    vital_value(obs)
                );
            });
        out.push('\n');
    }

    if !data.labs.is_empty() {
        out.push_str("## Laboratory Results:\n");
        for obs in data.labs.iter().take(MAX_SUMMARY_LABS).map(|e| &e.resource) {
            let _ = writeln!(
                out,
                "- {}: {}",
                concept_label(obs.code.as_ref(), false),
                lab_value(obs)
            );
        }
        out.push('\n');
    }

    if !data.conditions.is_empty() {
        out.push_str("## Active Conditions:\n");
        for condition in data.conditions.iter().map(|e| &e.resource) {
            let status = condition
                .clinical_status
                .as_ref()
                .and_then(|s| s.first_code())
                .unwrap_or("unknown");
            let _ = writeln!(
                out,
                "- {} (Status: {})",
                concept_label(condition.code.as_ref(), true),
                status
            );
        }
        out.push('\n');
    }

    if !data.medications.is_empty() {
        out.push_str("## Current Medications:\n");
        for med in data.medications.iter().map(|e| &e.resource) {
            let dosage = med
                .dosage_instruction
                .first()
                .and_then(|d| d.text.as_deref())
                .unwrap_or("No dosage info");
            let _ = writeln!(
                out,
                "- {}: {}",
                concept_label(med.medication_codeable_concept.as_ref(), true),
                dosage
            );
        }
        out.push('\n');
    }

    if !data.diagnostic_reports.is_empty() {
        out.push_str("## Recent Diagnostic Reports:\n");
        for report in data
            .diagnostic_reports
            .iter()
            .take(MAX_SUMMARY_REPORTS)
            .map(|e| &e.resource)
        {
            let _ = writeln!(
                out,
                "- {} (Status: {})",
                concept_label(report.code.as_ref(), true),
                report.status.as_deref().unwrap_or("unknown")
            );
        }
        out.push('\n');
    }

    out
}
