//! Submission input for new tasks.
//!
//! Labels are free text supplied by callers, so they are normalised here and
//! everything downstream can rely on non-blank values.

use serde::{Deserialize, Serialize};

use super::errors::CourierError;
use super::task::{DocumentRef, TaskType};

/// A request to create a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    /// What should be done, in the requester's words.
    pub description: String,

    /// Which software the automation targets (e.g. "SAP GUI").
    #[serde(default)]
    pub target_software: String,

    #[serde(default)]
    pub task_type: String,

    /// References to attached documents. The documents themselves live elsewhere.
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
}

/// A submission that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSubmission {
    pub description: String,
    pub target_software: String,
    pub task_type: TaskType,
    pub documents: Vec<DocumentRef>,
}

impl NewTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            target_software: String::new(),
            task_type: String::new(),
            documents: Vec::new(),
        }
    }

    pub fn for_software(mut self, software: impl Into<String>) -> Self {
        self.target_software = software.into();
        self
    }

    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn with_document(mut self, document: DocumentRef) -> Self {
        self.documents.push(document);
        self
    }

    pub fn validate(self) -> Result<ValidSubmission, CourierError> {
        let description = self.description.trim();
        if description.is_empty() {
            return Err(CourierError::Validation(
                "description must not be blank".to_string(),
            ));
        }
        if self.documents.iter().any(|d| d.as_str().trim().is_empty()) {
            return Err(CourierError::Validation(
                "document references must not be blank".to_string(),
            ));
        }

        Ok(ValidSubmission {
            description: description.to_string(),
            target_software: label_or(&self.target_software, "unknown"),
            task_type: TaskType::new(label_or(&self.task_type, "generic")),
            documents: self.documents,
        })
    }
}

fn label_or(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_description_is_rejected() {
        let err = NewTask::new("   ").validate().unwrap_err();
        assert!(matches!(err, CourierError::Validation(_)));
    }

    #[test]
    fn blank_labels_get_defaults() {
        let valid = NewTask::new("  enter invoice 4711  ").validate().unwrap();
        assert_eq!(valid.description, "enter invoice 4711");
        assert_eq!(valid.target_software, "unknown");
        assert_eq!(valid.task_type.as_str(), "generic");
    }

    #[test]
    fn blank_document_reference_is_rejected() {
        let err = NewTask::new("file expenses")
            .with_document(DocumentRef::new(""))
            .validate()
            .unwrap_err();
        assert!(matches!(err, CourierError::Validation(_)));
    }

    #[test]
    fn new_task_without_optional_fields_deserializes() {
        let json = r#"{ "description": "update customer address" }"#;
        let task: NewTask = serde_json::from_str(json).expect("deserialize");
        assert!(task.documents.is_empty());
        assert_eq!(task.target_software, "");
    }
}
