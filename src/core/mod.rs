//! AI-assisted clinical recommendations

pub mod ai;
pub mod data;
