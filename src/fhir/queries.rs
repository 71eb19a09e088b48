//! The fixed set of searches the dashboard runs against the FHIR server

use std::fmt;
use std::str::FromStr;

/// Page size for the patient picker
pub const PATIENT_LIST_COUNT: u32 = 50;
/// Page size for per-patient clinical searches
pub const CLINICAL_COUNT: u32 = 20;

pub const PATIENTS_ERROR: &str = "Failed to fetch patients";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClinicalCategory {
    Vitals,
    Labs,
    Conditions,
    Medications,
    DiagnosticReports,
}

impl ClinicalCategory {
    pub const ALL: [ClinicalCategory; 5] = [
        ClinicalCategory::Vitals,
        ClinicalCategory::Labs,
        ClinicalCategory::Conditions,
        ClinicalCategory::Medications,
        ClinicalCategory::DiagnosticReports,
    ];

    /// URL segment under `/api/patient/{id}/`
    pub fn segment(self) -> &'static str {
        match self {
            ClinicalCategory::Vitals => "vitals",
            ClinicalCategory::Labs => "labs",
            ClinicalCategory::Conditions => "conditions",
            ClinicalCategory::Medications => "medications",
            ClinicalCategory::DiagnosticReports => "diagnostic-reports",
        }
    }

    pub fn resource(self) -> &'static str {
        match self {
            ClinicalCategory::Vitals | ClinicalCategory::Labs => "Observation",
            ClinicalCategory::Conditions => "Condition",
            ClinicalCategory::Medications => "MedicationRequest",
            ClinicalCategory::DiagnosticReports => "DiagnosticReport",
        }
    }

    fn observation_category(self) -> Option<&'static str> {
        match self {
            ClinicalCategory::Vitals => Some("vital-signs"),
            ClinicalCategory::Labs => Some("laboratory"),
            _ => None,
        }
    }

    fn sort(self) -> &'static str {
        match self {
            ClinicalCategory::Conditions => "-recorded-date",
            ClinicalCategory::Medications => "-authoredon",
            _ => "-date",
        }
    }

    /// Search parameters, newest first
    pub fn search_params(self, patient_id: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![("patient", patient_id.to_string())];
        if let Some(category) = self.observation_category() {
            params.push(("category", category.to_string()));
        }
        params.push(("_count", CLINICAL_COUNT.to_string()));
        params.push(("_sort", self.sort().to_string()));
        params
    }

    /// Message shown to the dashboard when the search fails
    pub fn error_context(self) -> &'static str {
        match self {
            ClinicalCategory::Vitals => "Failed to fetch vitals",
            ClinicalCategory::Labs => "Failed to fetch labs",
            ClinicalCategory::Conditions => "Failed to fetch conditions",
            ClinicalCategory::Medications => "Failed to fetch medications",
            ClinicalCategory::DiagnosticReports => "Failed to fetch diagnostic reports",
        }
    }
}

impl fmt::Display for ClinicalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown clinical category '{}'", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for ClinicalCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClinicalCategory::ALL
            .into_iter()
            .find(|c| c.segment() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

pub fn patient_list_params() -> Vec<(&'static str, String)> {
    vec![("_count", PATIENT_LIST_COUNT.to_string())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("vitals", ClinicalCategory::Vitals ; "vitals")]
    #[test_case("labs", ClinicalCategory::Labs ; "labs")]
    #[test_case("conditions", ClinicalCategory::Conditions ; "conditions")]
    #[test_case("medications", ClinicalCategory::Medications ; "medications")]
    #[test_case("diagnostic-reports", ClinicalCategory::DiagnosticReports ; "reports")]
    fn segments_round_trip(segment: &str, expected: ClinicalCategory) {
        assert_eq!(segment.parse::<ClinicalCategory>(), Ok(expected));
        assert_eq!(expected.to_string(), segment);
    }

    #[test]
    fn unknown_segment_is_rejected() {
        assert_eq!(
            "allergies".parse::<ClinicalCategory>(),
            Err(UnknownCategory("allergies".into()))
        );
    }

    #[test]
    fn vitals_search_filters_by_category_and_sorts_by_date() {
        let params = ClinicalCategory::Vitals.search_params("p1");
        assert_eq!(
            params,
            vec![
                ("patient", "p1".to_string()),
                ("category", "vital-signs".to_string()),
                ("_count", "20".to_string()),
                ("_sort", "-date".to_string()),
            ]
        );
        assert_eq!(ClinicalCategory::Vitals.resource(), "Observation");
    }

    #[test_case(ClinicalCategory::Conditions, "Condition", "-recorded-date" ; "conditions")]
    #[test_case(ClinicalCategory::Medications, "MedicationRequest", "-authoredon" ; "medications")]
    #[test_case(ClinicalCategory::DiagnosticReports, "DiagnosticReport", "-date" ; "reports")]
    fn non_observation_searches(category: ClinicalCategory, resource: &str, sort: &str) {
        let params = category.search_params("p9");
        assert_eq!(category.resource(), resource);
        assert!(params.iter().all(|(k, _)| *k != "category"));
        assert_eq!(params.last(), Some(&("_sort", sort.to_string())));
    }

    #[test]
    fn patient_list_asks_for_fifty() {
        assert_eq!(patient_list_params(), vec![("_count", "50".to_string())]);
    }
}
