//! Reconcile planning
//!
//! Pure set arithmetic on camera ids. Descriptors of ids present on both
//! sides are never compared.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::camera_directory::CameraDescriptor;

/// Outcome of one reconcile pass
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<ReconcileFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileFailure {
    pub camera_id: String,
    pub error_code: String,
    pub message: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct Plan {
    pub to_stop: Vec<String>,
    pub to_start: Vec<String>,
    pub unchanged: Vec<String>,
}

pub(super) fn plan(running: &BTreeSet<String>, desired: &HashMap<&str, &CameraDescriptor>) -> Plan {
    let wanted: BTreeSet<&str> = desired.keys().copied().collect();

    Plan {
        to_stop: running
            .iter()
            .filter(|id| !wanted.contains(id.as_str()))
            .cloned()
            .collect(),
        to_start: wanted
            .iter()
            .filter(|id| !running.contains(**id))
            .map(|id| id.to_string())
            .collect(),
        unchanged: running
            .iter()
            .filter(|id| wanted.contains(id.as_str()))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan() {
        let a = CameraDescriptor::new("A", "rtsp://a");
        let c = CameraDescriptor::new("C", "rtsp://c");
        let desired: HashMap<&str, &CameraDescriptor> = [("A", &a), ("C", &c)].into();
        let running: BTreeSet<String> = ["A".to_string(), "B".to_string()].into();

        let plan = plan(&running, &desired);
        assert_eq!(plan.to_stop, vec!["B"]);
        assert_eq!(plan.to_start, vec!["C"]);
        assert_eq!(plan.unchanged, vec!["A"]);
    }

    #[test]
    fn test_plan_empty_desired_stops_everything() {
        let running: BTreeSet<String> = ["A".to_string(), "B".to_string()].into();
        let plan = plan(&running, &HashMap::new());
        assert_eq!(plan.to_stop, vec!["A", "B"]);
        assert!(plan.to_start.is_empty());
    }
}
