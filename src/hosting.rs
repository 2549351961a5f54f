// src/hosting.rs

//! Application-hosting data model.
//!
//! These types describe the patient / study / series / object hierarchy a
//! hosting environment hands to a module and gets back from it. The task
//! runner never looks inside them; a [`crate::task::TaskSpec`] only carries an
//! [`AvailableData`] through to its [`crate::task::TaskHandle`].

use serde::{Deserialize, Serialize};

/// Lifecycle state of a hosted application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Idle,
    InProgress,
    Completed,
    Suspended,
    Canceled,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusType {
    Information,
    Warning,
    Error,
    FatalError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub status_type: StatusType,
    pub coding_scheme_designator: String,
    pub code_value: String,
    pub code_meaning: String,
}

/// Where the bytes of an object live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLocator {
    pub locator: String,
    pub source: String,
    pub transfer_syntax: String,
    pub length: i64,
    pub offset: i64,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub descriptor_uuid: String,
    pub mime_type: String,
    pub class_uid: String,
    pub transfer_syntax_uid: String,
    pub modality: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub series_uid: String,
    #[serde(default)]
    pub object_descriptors: Vec<ObjectDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Study {
    pub study_uid: String,
    #[serde(default)]
    pub object_descriptors: Vec<ObjectDescriptor>,
    #[serde(default)]
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub name: String,
    pub id: String,
    pub assigning_authority: String,
    pub sex: String,
    pub birth_date: String,
    #[serde(default)]
    pub object_descriptors: Vec<ObjectDescriptor>,
    #[serde(default)]
    pub studies: Vec<Study>,
}

/// Everything a hosting environment makes available to a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableData {
    #[serde(default)]
    pub object_descriptors: Vec<ObjectDescriptor>,
    #[serde(default)]
    pub patients: Vec<Patient>,
}
