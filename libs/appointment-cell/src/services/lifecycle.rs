// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    AppointmentError, AppointmentStatus, NewHistoryEntry, STATUS_CHANGE,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Parses a requested status. Unknown values carry the valid list back.
    pub fn parse_status(&self, raw: &str) -> Result<AppointmentStatus, AppointmentError> {
        raw.parse::<AppointmentStatus>().inspect_err(|_| {
            warn!("Rejected unknown appointment status '{}'", raw);
        })
    }

    /// Statuses reachable from `current`. Front-desk staff correct mistakes by
    /// setting any status directly, so every status is reachable from every
    /// other. Tighten the graph here.
    pub fn allowed_transitions(&self, _current: AppointmentStatus) -> Vec<AppointmentStatus> {
        AppointmentStatus::ALL.to_vec()
    }

    pub fn validate_status_transition(
        &self,
        current: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current, next);

        if !self.allowed_transitions(current).contains(&next) {
            warn!("Status transition {} -> {} is not allowed", current, next);
            return Err(AppointmentError::ValidationError(format!(
                "cannot move an appointment from {} to {}",
                current, next
            )));
        }

        Ok(())
    }

    /// History entry for a status move.
    pub fn status_change_entry(
        &self,
        appointment_id: Uuid,
        old: AppointmentStatus,
        new: AppointmentStatus,
        actor: Option<Uuid>,
        notes: Option<String>,
    ) -> NewHistoryEntry {
        NewHistoryEntry {
            appointment_id,
            changed_by: actor,
            change_type: STATUS_CHANGE.to_string(),
            old_value: Some(old.to_string()),
            new_value: Some(new.to_string()),
            notes: notes.filter(|n| !n.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn any_status_can_follow_any_other() {
        let lifecycle = AppointmentLifecycleService::new();
        for from in AppointmentStatus::ALL {
            for to in AppointmentStatus::ALL {
                assert!(lifecycle.validate_status_transition(from, to).is_ok());
            }
        }
    }

    #[test]
    fn unknown_status_is_rejected_with_valid_list() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_eq!(lifecycle.parse_status("arrived").unwrap(), AppointmentStatus::Arrived);
        assert_matches!(
            lifecycle.parse_status("teleported"),
            Err(AppointmentError::InvalidStatus { valid, .. }) if valid.len() == AppointmentStatus::ALL.len()
        );
    }

    #[test]
    fn status_entry_records_both_sides() {
        let lifecycle = AppointmentLifecycleService::new();
        let id = Uuid::new_v4();
        let entry = lifecycle.status_change_entry(
            id,
            AppointmentStatus::Scheduled,
            AppointmentStatus::Confirmed,
            None,
            Some("  ".to_string()),
        );

        assert_eq!(entry.change_type, "status_change");
        assert_eq!(entry.old_value.as_deref(), Some("scheduled"));
        assert_eq!(entry.new_value.as_deref(), Some("confirmed"));
        assert_eq!(entry.notes, None);
    }
}
