//! Equipment record shapes exchanged with the persistence layer.

use common::EquipmentId;
use serde::{Deserialize, Serialize};

/// A persisted equipment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub name: String,
    pub serial_number: String,
    pub location: Option<String>,
    /// Deployment sequence number, assigned when the record was deployed.
    pub sequence_number: Option<i64>,
}

impl Equipment {
    /// Checks the fields every record must carry.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        required_fields(&self.name, &self.serial_number)
    }

    /// Returns the names of fields whose values differ from `other`.
    pub fn changed_fields(&self, other: &Equipment) -> Vec<String> {
        let mut changed = Vec::new();
        if self.name != other.name {
            changed.push("name".to_string());
        }
        if self.serial_number != other.serial_number {
            changed.push("serial_number".to_string());
        }
        if self.location != other.location {
            changed.push("location".to_string());
        }
        if self.sequence_number != other.sequence_number {
            changed.push("sequence_number".to_string());
        }
        changed
    }
}

/// A record that has not been stored yet and so has no ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEquipment {
    pub name: String,
    pub serial_number: String,
    pub location: Option<String>,
    pub sequence_number: Option<i64>,
}

impl NewEquipment {
    pub fn new(name: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serial_number: serial_number.into(),
            location: None,
            sequence_number: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Checks the fields every record must carry.
    ///
    /// Returns one message per missing field.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        required_fields(&self.name, &self.serial_number)
    }

    /// Attaches the ID the store assigned.
    pub fn into_record(self, id: EquipmentId) -> Equipment {
        Equipment {
            id,
            name: self.name,
            serial_number: self.serial_number,
            location: self.location,
            sequence_number: self.sequence_number,
        }
    }
}

fn required_fields(name: &str, serial_number: &str) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    if name.trim().is_empty() {
        errors.push("name is required".to_string());
    }
    if serial_number.trim().is_empty() {
        errors.push("serial_number is required".to_string());
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// New values for an existing record. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentPatch {
    pub name: Option<String>,
    pub serial_number: Option<String>,
    /// `Some(None)` clears the location.
    pub location: Option<Option<String>>,
}

impl EquipmentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    pub fn location(mut self, location: Option<String>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.serial_number.is_none() && self.location.is_none()
    }

    /// Returns `current` with the patched fields replaced.
    pub fn apply(&self, current: &Equipment) -> Equipment {
        let mut next = current.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(serial_number) = &self.serial_number {
            next.serial_number = serial_number.clone();
        }
        if let Some(location) = &self.location {
            next.location = location.clone();
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_only_touches_given_fields() {
        let current = NewEquipment::new("Forklift", "FL-001")
            .with_location("Dock 3")
            .into_record(EquipmentId::new(4));

        let patched = EquipmentPatch::new().name("Forklift XL").apply(&current);
        assert_eq!(patched.name, "Forklift XL");
        assert_eq!(patched.serial_number, "FL-001");
        assert_eq!(patched.location.as_deref(), Some("Dock 3"));

        let cleared = EquipmentPatch::new().location(None).apply(&current);
        assert_eq!(cleared.location, None);
        assert!(EquipmentPatch::new().is_empty());
    }

    #[test]
    fn test_validate_accepts_complete_record() {
        let record = NewEquipment::new("Forklift", "FL-001").with_location("Dock 3");
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_each_missing_field() {
        let record = NewEquipment::new(" ", "");
        let errors = record.validate().unwrap_err();
        assert_eq!(
            errors,
            vec!["name is required", "serial_number is required"]
        );
    }

    #[test]
    fn test_changed_fields() {
        let before = NewEquipment::new("Forklift", "FL-001").into_record(EquipmentId::new(1));
        let mut after = before.clone();
        after.location = Some("Yard".to_string());
        after.name = "Forklift XL".to_string();

        assert_eq!(after.changed_fields(&before), vec!["name", "location"]);
        assert!(before.changed_fields(&before).is_empty());
    }

    #[test]
    fn test_record_serialization_uses_raw_id() {
        let record = NewEquipment::new("Crane", "CR-9").into_record(EquipmentId::new(12));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 12);
        assert_eq!(json["serial_number"], "CR-9");
    }
}
