//! Data models shared by the FHIR proxy, the dashboard view and the AI advisor

pub mod patient;
pub mod resources;
