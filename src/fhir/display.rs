//! Presentation rules for the clinical dashboard
//!
//! Turns raw bundle entries into the labels, values and badges a clinician
//! sees, so every client renders a patient the same way.

use chrono::{DateTime, NaiveDate};
use serde::Serialize;

use crate::models::patient::{BundleEntry, PatientData};
use crate::models::resources::{HumanName, Observation, Patient, UserResource};

pub const LOINC: &str = "http://loinc.org";
pub const BP_PANEL: &str = "85354-9";
pub const SYSTOLIC_BP: &str = "8480-6";
pub const DIASTOLIC_BP: &str = "8462-4";

const MAX_VITAL_CARDS: usize = 8;
const MAX_LAB_ROWS: usize = 5;

pub const UNKNOWN: &str = "Unknown";
pub const NOT_AVAILABLE: &str = "N/A";

/// Given names then family name from the first `HumanName`
pub fn format_human_name(names: &[HumanName]) -> String {
    let Some(name) = names.first() else {
        return UNKNOWN.to_string();
    };
    let full = format!(
        "{} {}",
        name.given.join(" "),
        name.family.as_deref().unwrap_or("")
    );
    let full = full.trim();
    if full.is_empty() {
        UNKNOWN.to_string()
    } else {
        full.to_string()
    }
}

/// Display name for the logged-in provider's FHIR resource
pub fn user_display_name(user: &UserResource) -> String {
    if !user.name.is_empty() {
        return format_human_name(&user.name);
    }
    user.practitioner_role
        .first()
        .and_then(|role| role.practitioner.as_ref())
        .and_then(|p| p.display.clone())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Calendar date of a FHIR date or dateTime
pub fn format_date(value: Option<&str>) -> String {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return UNKNOWN.to_string();
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.date_naive().to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.to_string();
    }
    raw.to_string()
}

pub fn observation_name(obs: &Observation) -> String {
    obs.code
        .as_ref()
        .and_then(|c| c.text_or_display())
        .unwrap_or(UNKNOWN)
        .to_string()
}

fn format_quantity_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value)
    } else {
        format!("{:.2}", value)
    }
}

pub fn format_observation_value(obs: &Observation) -> String {
    if let Some(reason) = &obs.data_absent_reason {
        return reason.first_display().unwrap_or(NOT_AVAILABLE).to_string();
    }

    if let Some(components) = obs.component.as_ref().filter(|c| !c.is_empty()) {
        return components
            .iter()
            .map(|comp| {
                let name = comp
                    .code
                    .as_ref()
                    .and_then(|c| c.first_display())
                    .and_then(|d| d.split(' ').next())
                    .unwrap_or("");
                let quantity = comp.value_quantity.as_ref();
                let value = quantity
                    .and_then(|q| q.value)
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                let unit = quantity.and_then(|q| q.unit.as_deref()).unwrap_or("");
                format!("{}: {}{}", name, value, unit)
            })
            .collect::<Vec<_>>()
            .join(" / ");
    }

    if let Some(quantity) = &obs.value_quantity {
        let value = quantity.value.map(format_quantity_number).unwrap_or_default();
        let unit = quantity
            .unit
            .as_deref()
            .or(quantity.code.as_deref())
            .unwrap_or("");
        return format!("{} {}", value, unit).trim().to_string();
    }

    if let Some(concept) = &obs.value_codeable_concept {
        return concept.text_or_display().unwrap_or(NOT_AVAILABLE).to_string();
    }

    if let Some(text) = &obs.value_string {
        return text.clone();
    }

    NOT_AVAILABLE.to_string()
}

fn is_blood_pressure_panel(obs: &Observation) -> bool {
    obs.code
        .as_ref()
        .map_or(false, |c| c.has_coding(LOINC, &[BP_PANEL]))
}

fn is_standalone_bp_component(obs: &Observation) -> bool {
    obs.code
        .as_ref()
        .map_or(false, |c| c.has_coding(LOINC, &[SYSTOLIC_BP, DIASTOLIC_BP]))
}

/// Vitals worth a card: no absent values, no panels of panels, and no
/// separate systolic/diastolic readings when a blood pressure panel exists.
pub fn visible_vitals(entries: &[BundleEntry<Observation>]) -> Vec<&Observation> {
    let has_bp_panel = entries.iter().any(|e| is_blood_pressure_panel(&e.resource));

    entries
        .iter()
        .map(|e| &e.resource)
        .filter(|obs| obs.data_absent_reason.is_none())
        .filter(|obs| !(has_bp_panel && is_standalone_bp_component(obs)))
        .filter(|obs| obs.has_member.is_none())
        .take(MAX_VITAL_CARDS)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub rows: Vec<DataRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<&'static str>,
}

impl Section {
    fn new(rows: Vec<DataRow>, empty_message: &'static str) -> Self {
        let empty_message = rows.is_empty().then_some(empty_message);
        Section { rows, empty_message }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientHeader {
    pub id: Option<String>,
    pub name: String,
    pub gender: String,
    pub birth_date: String,
}

impl From<&Patient> for PatientHeader {
    fn from(patient: &Patient) -> Self {
        PatientHeader {
            id: patient.id.clone(),
            name: format_human_name(&patient.name),
            gender: patient.gender.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            birth_date: format_date(patient.birth_date.as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientHeader>,
    pub vitals: Section,
    pub labs: Section,
    pub conditions: Section,
    pub medications: Section,
    pub diagnostic_reports: Section,
}

impl DashboardView {
    pub fn build(patient: Option<&Patient>, data: &PatientData) -> Self {
        let vitals = visible_vitals(&data.vitals)
            .into_iter()
            .map(|obs| DataRow {
                id: obs.id.clone(),
                label: observation_name(obs),
                value: Some(format_observation_value(obs)),
                status: None,
                date: Some(format_date(obs.effective_date_time.as_deref())),
            })
            .collect();

        let labs = data
            .labs
            .iter()
            .take(MAX_LAB_ROWS)
            .map(|e| &e.resource)
            .map(|obs| DataRow {
                id: obs.id.clone(),
                label: observation_name(obs),
                value: Some(format_observation_value(obs)),
                status: None,
                date: Some(format_date(obs.effective_date_time.as_deref())),
            })
            .collect();

        let conditions = data
            .conditions
            .iter()
            .map(|e| &e.resource)
            .map(|condition| DataRow {
                id: condition.id.clone(),
                label: condition
                    .code
                    .as_ref()
                    .and_then(|c| c.text_or_display())
                    .unwrap_or("Unknown condition")
                    .to_string(),
                value: None,
                status: Some(
                    condition
                        .clinical_status
                        .as_ref()
                        .and_then(|s| s.first_code())
                        .unwrap_or(UNKNOWN)
                        .to_string(),
                ),
                date: Some(format_date(condition.recorded_date.as_deref())),
            })
            .collect();

        let medications = data
            .medications
            .iter()
            .map(|e| &e.resource)
            .map(|med| DataRow {
                id: med.id.clone(),
                label: med
                    .medication_codeable_concept
                    .as_ref()
                    .and_then(|c| c.text_or_display())
                    .unwrap_or("Unknown medication")
                    .to_string(),
                value: Some(
                    med.dosage_instruction
                        .first()
                        .and_then(|d| d.text.clone())
                        .unwrap_or_else(|| "No dosage info".to_string()),
                ),
                status: Some(med.status.clone().unwrap_or_else(|| UNKNOWN.to_string())),
                date: None,
            })
            .collect();

        let diagnostic_reports = data
            .diagnostic_reports
            .iter()
            .map(|e| &e.resource)
            .map(|report| DataRow {
                id: report.id.clone(),
                label: report
                    .code
                    .as_ref()
                    .and_then(|c| c.text_or_display())
                    .unwrap_or("Unknown report")
                    .to_string(),
                value: None,
                status: Some(report.status.clone().unwrap_or_else(|| UNKNOWN.to_string())),
                date: Some(format_date(report.effective_date_time.as_deref())),
            })
            .collect();

        DashboardView {
            patient: patient.map(PatientHeader::from),
            vitals: Section::new(vitals, "No vital signs with values available"),
            labs: Section::new(labs, "No lab results available"),
            conditions: Section::new(conditions, "No conditions recorded"),
            medications: Section::new(medications, "No medications recorded"),
            diagnostic_reports: Section::new(diagnostic_reports, "No diagnostic reports available"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resources::{CodeableConcept, Coding, ObservationComponent, Quantity};
    use serde_json::json;
    use test_case::test_case;

    fn loinc(code: &str, display: &str) -> Option<CodeableConcept> {
        Some(CodeableConcept {
            coding: vec![Coding {
                system: Some(LOINC.into()),
                code: Some(code.into()),
                display: Some(display.into()),
            }],
            text: None,
        })
    }

    fn quantity(value: f64, unit: Option<&str>) -> Option<Quantity> {
        Some(Quantity {
            value: Some(value),
            unit: unit.map(String::from),
            code: None,
        })
    }

    #[test_case(&[], "Unknown" ; "no names")]
    #[test_case(&[HumanName { given: vec!["Ada".into(), "King".into()], family: Some("Lovelace".into()) }], "Ada King Lovelace" ; "given and family")]
    #[test_case(&[HumanName { given: vec![], family: Some("Curie".into()) }], "Curie" ; "family only")]
    #[test_case(&[HumanName::default()], "Unknown" ; "blank name")]
    fn human_names(names: &[HumanName], expected: &str) {
        assert_eq!(format_human_name(names), expected);
    }

    #[test]
    fn user_names_fall_back_to_practitioner_role() {
        let named: UserResource = serde_json::from_value(json!({
            "resourceType": "Practitioner",
            "name": [{"given": ["Gregory"], "family": "House"}]
        }))
        .unwrap();
        assert_eq!(user_display_name(&named), "Gregory House");

        let person: UserResource = serde_json::from_value(json!({
            "resourceType": "Person",
            "practitionerRole": [{"practitioner": {"display": "Dr. Quinn"}}]
        }))
        .unwrap();
        assert_eq!(user_display_name(&person), "Dr. Quinn");

        assert_eq!(user_display_name(&UserResource::default()), "Unknown");
    }

    #[test_case(None, "Unknown" ; "missing")]
    #[test_case(Some("1980-02-29"), "1980-02-29" ; "date")]
    #[test_case(Some("2024-03-05T23:10:00-05:00"), "2024-03-05" ; "datetime keeps its own offset")]
    #[test_case(Some("1980-02"), "1980-02" ; "partial date passes through")]
    fn dates(input: Option<&str>, expected: &str) {
        assert_eq!(format_date(input), expected);
    }

    #[test_case(120.0, Some("mmHg"), "120 mmHg" ; "integer")]
    #[test_case(36.666, Some("Cel"), "36.67 Cel" ; "two decimals")]
    #[test_case(5.0, None, "5" ; "no unit")]
    fn quantity_values(value: f64, unit: Option<&str>, expected: &str) {
        let obs = Observation {
            value_quantity: quantity(value, unit),
            ..Default::default()
        };
        assert_eq!(format_observation_value(&obs), expected);
    }

    #[test]
    fn quantity_falls_back_to_ucum_code() {
        let obs = Observation {
            value_quantity: Some(Quantity {
                value: Some(72.0),
                unit: None,
                code: Some("/min".into()),
            }),
            ..Default::default()
        };
        assert_eq!(format_observation_value(&obs), "72 /min");
    }

    #[test]
    fn data_absent_reason_wins() {
        let obs = Observation {
            data_absent_reason: Some(CodeableConcept {
                coding: vec![Coding {
                    display: Some("Asked But Unknown".into()),
                    ..Default::default()
                }],
                text: None,
            }),
            value_quantity: quantity(1.0, Some("kg")),
            ..Default::default()
        };
        assert_eq!(format_observation_value(&obs), "Asked But Unknown");
    }

    #[test]
    fn components_use_first_word_of_display() {
        let obs = Observation {
            component: Some(vec![
                ObservationComponent {
                    code: loinc(SYSTOLIC_BP, "Systolic blood pressure"),
                    value_quantity: quantity(120.0, Some("mmHg")),
                },
                ObservationComponent {
                    code: loinc(DIASTOLIC_BP, "Diastolic blood pressure"),
                    value_quantity: quantity(80.0, Some("mmHg")),
                },
            ]),
            ..Default::default()
        };
        assert_eq!(
            format_observation_value(&obs),
            "Systolic: 120mmHg / Diastolic: 80mmHg"
        );
    }

    #[test]
    fn coded_and_string_values() {
        let coded = Observation {
            value_codeable_concept: Some(CodeableConcept {
                coding: vec![],
                text: Some("Positive".into()),
            }),
            ..Default::default()
        };
        assert_eq!(format_observation_value(&coded), "Positive");

        let text = Observation {
            value_string: Some("trace".into()),
            ..Default::default()
        };
        assert_eq!(format_observation_value(&text), "trace");
        assert_eq!(format_observation_value(&Observation::default()), "N/A");
    }

    #[test]
    fn bp_panel_hides_standalone_readings() {
        let entries: Vec<BundleEntry<Observation>> = serde_json::from_value(json!([
            {"resource": {"id": "panel", "code": {"coding": [{"system": LOINC, "code": BP_PANEL}]}}},
            {"resource": {"id": "sys", "code": {"coding": [{"system": LOINC, "code": SYSTOLIC_BP}]}}},
            {"resource": {"id": "dia", "code": {"coding": [{"system": LOINC, "code": DIASTOLIC_BP}]}}},
            {"resource": {"id": "hr", "code": {"coding": [{"system": LOINC, "code": "8867-4"}]}}},
            {"resource": {"id": "absent", "dataAbsentReason": {"text": "unknown"}}},
            {"resource": {"id": "group", "hasMember": [{"reference": "Observation/x"}]}}
        ]))
        .unwrap();

        let ids: Vec<_> = visible_vitals(&entries)
            .iter()
            .map(|o| o.id.clone().unwrap())
            .collect();
        assert_eq!(ids, ["panel", "hr"]);
    }

    #[test]
    fn standalone_readings_shown_without_panel() {
        let entries: Vec<BundleEntry<Observation>> = serde_json::from_value(json!([
            {"resource": {"id": "sys", "code": {"coding": [{"system": LOINC, "code": SYSTOLIC_BP}]}}},
            {"resource": {"id": "dia", "code": {"coding": [{"system": LOINC, "code": DIASTOLIC_BP}]}}}
        ]))
        .unwrap();
        assert_eq!(visible_vitals(&entries).len(), 2);
    }

    #[test]
    fn vitals_are_capped_at_eight() {
        let entries: Vec<_> = (0..12)
            .map(|i| {
                BundleEntry::new(Observation {
                    id: Some(i.to_string()),
                    ..Default::default()
                })
            })
            .collect();
        assert_eq!(visible_vitals(&entries).len(), 8);
    }

    #[test]
    fn empty_dashboard_reports_empty_states() {
        let view = DashboardView::build(None, &PatientData::default());
        assert_eq!(view.vitals.empty_message, Some("No vital signs with values available"));
        assert_eq!(view.labs.empty_message, Some("No lab results available"));
        assert_eq!(view.conditions.empty_message, Some("No conditions recorded"));
        assert_eq!(view.medications.empty_message, Some("No medications recorded"));
        assert_eq!(
            view.diagnostic_reports.empty_message,
            Some("No diagnostic reports available")
        );
        assert!(view.patient.is_none());
    }

    #[test]
    fn dashboard_rows_and_badges() {
        let data: PatientData = serde_json::from_value(json!({
            "labs": (0..7).map(|i| json!({"resource": {"code": {"text": format!("Lab {}", i)}}})).collect::<Vec<_>>(),
            "conditions": [{"resource": {
                "code": {"coding": [{"display": "Hypertension"}]},
                "clinicalStatus": {"coding": [{"code": "active"}]},
                "recordedDate": "2023-06-01"
            }}],
            "medications": [{"resource": {"status": "active"}}],
            "diagnosticReports": [{"resource": {"code": {"text": "CBC"}}}]
        }))
        .unwrap();
        let patient = Patient {
            id: Some("p1".into()),
            name: vec![HumanName {
                given: vec!["Jo".into()],
                family: Some("Doe".into()),
            }],
            gender: None,
            birth_date: Some("1970-01-01".into()),
        };

        let view = DashboardView::build(Some(&patient), &data);

        assert_eq!(view.labs.rows.len(), 5);
        assert_eq!(view.labs.rows[0].value.as_deref(), Some("N/A"));

        let condition = &view.conditions.rows[0];
        assert_eq!(condition.label, "Hypertension");
        assert_eq!(condition.status.as_deref(), Some("active"));
        assert_eq!(condition.date.as_deref(), Some("2023-06-01"));

        let med = &view.medications.rows[0];
        assert_eq!(med.label, "Unknown medication");
        assert_eq!(med.value.as_deref(), Some("No dosage info"));

        let report = &view.diagnostic_reports.rows[0];
        assert_eq!(report.status.as_deref(), Some("Unknown"));
        assert_eq!(report.date.as_deref(), Some("Unknown"));

        let header = view.patient.unwrap();
        assert_eq!(header.name, "Jo Doe");
        assert_eq!(header.gender, "Unknown");
        assert_eq!(header.birth_date, "1970-01-01");
    }
}
