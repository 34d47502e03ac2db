mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentCandidate, AppointmentError, AppointmentStatus, UpdateAppointmentRequest,
};
use appointment_cell::services::AppointmentStore;

use common::{booking_request, service_at, service_over, HistoryDownStore, SlowStore};

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn june(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
}

// Monday 2024-06-10, 07:00 at the clinic.
fn monday_morning() -> (
    std::sync::Arc<appointment_cell::services::AppointmentBookingService>,
    std::sync::Arc<appointment_cell::services::InMemoryAppointmentStore>,
) {
    service_at(2024, 6, 10, 7, 0)
}

#[tokio::test]
async fn overlapping_candidate_is_rejected_with_conflict_list() {
    let (service, _) = monday_morning();
    let doctor = Uuid::new_v4();
    service
        .create_appointment(booking_request(doctor, "10/06/2024", "09:00", 30, "Khach A"), None)
        .await
        .unwrap();

    let result = service
        .create_appointment(booking_request(doctor, "10/06/2024", "09:15", 30, "Khach B"), None)
        .await;

    assert_matches!(result, Err(AppointmentError::OverlapConflict(conflicts)) => {
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].time, time(9, 0));
        assert_eq!(conflicts[0].customer, "Khach A");
        assert_eq!(conflicts[0].duration, 30);
    });
}

#[tokio::test]
async fn back_to_back_booking_is_accepted() {
    let (service, _) = monday_morning();
    let doctor = Uuid::new_v4();
    service
        .create_appointment(booking_request(doctor, "2024-06-10", "09:00", 30, "Khach A"), None)
        .await
        .unwrap();

    let second = service
        .create_appointment(booking_request(doctor, "2024-06-10", "09:30", 30, "Khach B"), None)
        .await
        .unwrap();

    assert_eq!(second.appointment_time, time(9, 30));
    assert_eq!(second.end_time, Some(time(10, 0)));
}

#[tokio::test]
async fn yesterday_is_past_regardless_of_time() {
    let (service, _) = monday_morning();

    for slot in ["08:00", "19:00"] {
        let result = service
            .create_appointment(booking_request(Uuid::new_v4(), "09/06/2024", slot, 30, "Khach"), None)
            .await;
        assert_matches!(result, Err(AppointmentError::PastBooking(_)));
    }
}

#[tokio::test]
async fn sunday_afternoon_is_outside_business_hours() {
    let (service, _) = monday_morning();

    let result = service
        .create_appointment(booking_request(Uuid::new_v4(), "16/06/2024", "13:00", 30, "Khach"), None)
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::OutsideBusinessHours { opens: 8, closes: 12, .. })
    );
}

#[tokio::test]
async fn completing_appointment_appends_one_history_row() {
    let (service, store) = monday_morning();
    let actor = Uuid::new_v4();
    let appointment = service
        .create_appointment(booking_request(Uuid::new_v4(), "10/06/2024", "10:00", 45, "Khach"), None)
        .await
        .unwrap();
    service
        .transition_status(appointment.id, "in_progress", Some(actor), None)
        .await
        .unwrap();
    let before = store.history(appointment.id).await.unwrap().len();

    let updated = service
        .transition_status(appointment.id, "completed", Some(actor), Some("paid in full".to_string()))
        .await
        .unwrap();

    assert_eq!(updated.status, AppointmentStatus::Completed);
    let history = service.history(appointment.id).await.unwrap();
    assert_eq!(history.len(), before + 1);

    let latest = &history[0];
    assert_eq!(latest.change_type, "status_change");
    assert_eq!(latest.old_value.as_deref(), Some("in_progress"));
    assert_eq!(latest.new_value.as_deref(), Some("completed"));
    assert_eq!(latest.changed_by, Some(actor));
    assert_eq!(latest.notes.as_deref(), Some("paid in full"));
}

#[tokio::test]
async fn unknown_status_and_missing_appointment_write_no_history() {
    let (service, store) = monday_morning();
    let appointment = service
        .create_appointment(booking_request(Uuid::new_v4(), "10/06/2024", "11:00", 30, "Khach"), None)
        .await
        .unwrap();

    assert_matches!(
        service.transition_status(appointment.id, "paid", None, None).await,
        Err(AppointmentError::InvalidStatus { given, .. }) if given == "paid"
    );
    assert_matches!(
        service.transition_status(Uuid::new_v4(), "cancelled", None, None).await,
        Err(AppointmentError::NotFound)
    );
    assert!(store.history(appointment.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_in_place_does_not_conflict_with_itself() {
    let (service, _) = monday_morning();
    let doctor = Uuid::new_v4();
    let appointment = service
        .create_appointment(booking_request(doctor, "10/06/2024", "14:00", 30, "Khach"), None)
        .await
        .unwrap();

    let extended = service
        .update_appointment(
            appointment.id,
            UpdateAppointmentRequest {
                duration_minutes: Some(60),
                ..UpdateAppointmentRequest::default()
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(extended.duration_minutes, 60);
    assert_eq!(extended.end_time, Some(time(15, 0)));
    // Duration-only edits keep the slot, so nothing is logged.
    assert!(service.history(appointment.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn reschedule_is_validated_and_audited() {
    let (service, _) = monday_morning();
    let doctor = Uuid::new_v4();
    let first = service
        .create_appointment(booking_request(doctor, "10/06/2024", "09:00", 30, "Khach A"), None)
        .await
        .unwrap();
    let second = service
        .create_appointment(booking_request(doctor, "10/06/2024", "10:00", 30, "Khach B"), None)
        .await
        .unwrap();

    let blocked = service
        .update_appointment(
            second.id,
            UpdateAppointmentRequest {
                appointment_time: Some(time(9, 0)),
                ..UpdateAppointmentRequest::default()
            },
            None,
        )
        .await;
    assert_matches!(blocked, Err(AppointmentError::ExactSlotConflict { customer, .. }) if customer == "Khach A");

    let actor = Uuid::new_v4();
    let moved = service
        .update_appointment(
            first.id,
            UpdateAppointmentRequest {
                appointment_date: Some(june(11)),
                end_time: Some(time(9, 45)),
                ..UpdateAppointmentRequest::default()
            },
            Some(actor),
        )
        .await
        .unwrap();
    assert_eq!(moved.appointment_date, june(11));
    assert_eq!(moved.duration_minutes, 45);

    let history = service.history(first.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].change_type, "reschedule");
    assert_eq!(history[0].changed_by, Some(actor));
    assert!(history[0].old_value.as_deref().unwrap().starts_with("10/06/2024 09:00"));
    assert!(history[0].new_value.as_deref().unwrap().starts_with("11/06/2024 09:00"));
}

#[tokio::test]
async fn validate_and_prepare_only_excludes_self_on_update() {
    let (service, _) = monday_morning();
    let doctor = Uuid::new_v4();
    let existing = service
        .create_appointment(booking_request(doctor, "10/06/2024", "15:00", 30, "Khach"), None)
        .await
        .unwrap();

    let candidate = AppointmentCandidate {
        doctor_id: doctor,
        appointment_date: june(10),
        appointment_time: time(15, 0),
        duration_minutes: 30,
        end_time: None,
    };

    assert_matches!(
        service.validate_and_prepare(&candidate, false, Some(existing.id)).await,
        Err(AppointmentError::ExactSlotConflict { .. })
    );
    let slot = service
        .validate_and_prepare(&candidate, true, Some(existing.id))
        .await
        .unwrap();
    assert_eq!(slot.end_time, time(15, 30));
}

#[tokio::test]
async fn cancelled_appointments_still_hold_their_slot() {
    let (service, _) = monday_morning();
    let doctor = Uuid::new_v4();
    let appointment = service
        .create_appointment(booking_request(doctor, "10/06/2024", "16:00", 30, "Khach"), None)
        .await
        .unwrap();
    service
        .transition_status(appointment.id, "cancelled", None, None)
        .await
        .unwrap();

    let report = service
        .check_availability(doctor, june(10), time(16, 0), None, None)
        .await
        .unwrap();
    assert!(!report.available);
    assert_eq!(report.conflicts[0].status, AppointmentStatus::Cancelled);
    assert_eq!(report.conflicts[0].status_display, "Đã huỷ");
}

#[tokio::test]
async fn availability_check_reports_past_and_excludes_edited_row() {
    let (service, _) = service_at(2024, 6, 10, 12, 30);
    let doctor = Uuid::new_v4();
    let appointment = service
        .create_appointment(booking_request(doctor, "10/06/2024", "13:00", 30, "Khach"), None)
        .await
        .unwrap();

    let past = service
        .check_availability(doctor, june(10), time(12, 0), Some(30), None)
        .await
        .unwrap();
    assert!(past.is_past);
    assert!(!past.available);
    assert!(past.conflicts.is_empty());

    let editing = service
        .check_availability(doctor, june(10), time(13, 0), Some(30), Some(appointment.id))
        .await
        .unwrap();
    assert!(editing.available);
    assert!(editing.within_business_hours);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_for_one_slot_admit_exactly_one() {
    let (service, store) = monday_morning();
    let doctor = Uuid::new_v4();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .create_appointment(
                        booking_request(doctor, "10/06/2024", "17:00", 30, &format!("Khach {}", i)),
                        None,
                    )
                    .await
            })
        })
        .collect();

    let mut booked = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => booked += 1,
            Err(err) => assert_matches!(err, AppointmentError::ExactSlotConflict { .. } | AppointmentError::SlotTaken),
        }
    }

    assert_eq!(booked, 1);
    assert_eq!(store.find_appointments(doctor, june(10)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn notes_edit_racing_a_status_change_keeps_the_new_status() {
    let store = Arc::new(SlowStore::new(Duration::ZERO, Duration::from_millis(100)));
    let service = service_over(store.clone(), 2024, 6, 10, 7, 0);
    let appointment = service
        .create_appointment(booking_request(Uuid::new_v4(), "10/06/2024", "09:00", 30, "Khach"), None)
        .await
        .unwrap();

    let edit = service.update_appointment(
        appointment.id,
        UpdateAppointmentRequest {
            notes: Some("gọi lại trước 1 ngày".to_string()),
            ..UpdateAppointmentRequest::default()
        },
        None,
    );
    let complete = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        service.transition_status(appointment.id, "completed", None, None).await
    };
    let (edited, completed) = tokio::join!(edit, complete);
    edited.unwrap();
    completed.unwrap();

    let stored = service.get_appointment(appointment.id).await.unwrap();
    assert_eq!(stored.status, AppointmentStatus::Completed);
    assert_eq!(stored.notes.as_deref(), Some("gọi lại trước 1 ngày"));

    let history = service.history(appointment.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_value.as_deref(), Some("completed"));
}

#[tokio::test]
async fn concurrent_transitions_keep_the_history_chain_linked() {
    let store = Arc::new(SlowStore::new(Duration::from_millis(50), Duration::ZERO));
    let service = service_over(store.clone(), 2024, 6, 10, 7, 0);
    let appointment = service
        .create_appointment(booking_request(Uuid::new_v4(), "10/06/2024", "09:30", 30, "Khach"), None)
        .await
        .unwrap();

    let (confirmed, cancelled) = tokio::join!(
        service.transition_status(appointment.id, "confirmed", None, None),
        service.transition_status(appointment.id, "cancelled", None, None),
    );
    confirmed.unwrap();
    cancelled.unwrap();

    // Newest first.
    let history = store.inner.history(appointment.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].old_value.as_deref(), Some("scheduled"));
    assert_eq!(history[0].old_value, history[1].new_value);

    let stored = store.inner.get(appointment.id).await.unwrap().unwrap();
    assert_eq!(Some(stored.status.as_str()), history[0].new_value.as_deref());
}

#[tokio::test]
async fn failed_reschedule_leaves_the_slot_and_history_untouched() {
    let store = Arc::new(HistoryDownStore::new());
    let service = service_over(store.clone(), 2024, 6, 10, 7, 0);
    let appointment = service
        .create_appointment(booking_request(Uuid::new_v4(), "10/06/2024", "10:00", 30, "Khach"), None)
        .await
        .unwrap();

    let moved = service
        .update_appointment(
            appointment.id,
            UpdateAppointmentRequest {
                appointment_time: Some(time(11, 0)),
                ..UpdateAppointmentRequest::default()
            },
            Some(Uuid::new_v4()),
        )
        .await;
    assert_matches!(moved, Err(AppointmentError::DatabaseError(_)));

    let stored = store.inner.get(appointment.id).await.unwrap().unwrap();
    assert_eq!(stored.appointment_time, time(10, 0));
    assert!(store.inner.history(appointment.id).await.unwrap().is_empty());

    // Edits that do not move the slot write no history and still go through.
    let renamed = service
        .update_appointment(
            appointment.id,
            UpdateAppointmentRequest {
                customer_name: Some("Khach Moi".to_string()),
                ..UpdateAppointmentRequest::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(renamed.customer_name, "Khach Moi");
}

#[test]
fn listing_views_follow_the_clinic_clock() {
    let (service, _) = service_at(2024, 6, 10, 9, 0);
    let doctor = Uuid::new_v4();

    tokio_test::block_on(async {
        for (date, slot) in [("10/06/2024", "10:00"), ("10/06/2024", "09:30"), ("12/06/2024", "08:00"), ("25/06/2024", "08:00")] {
            service
                .create_appointment(booking_request(doctor, date, slot, 30, "Khach"), None)
                .await
                .unwrap();
        }

        let today = service.today_appointments().await.unwrap();
        let times: Vec<NaiveTime> = today.iter().map(|a| a.appointment_time).collect();
        assert_eq!(times, vec![time(9, 30), time(10, 0)]);

        let calendar = service.calendar(None, None, Some(doctor), None).await.unwrap();
        assert_eq!(calendar.len(), 3);

        assert_matches!(
            service.calendar(Some(june(20)), Some(june(19)), None, None).await,
            Err(AppointmentError::ValidationError(_))
        );

        let upcoming = service.upcoming_appointments().await.unwrap();
        assert_eq!(upcoming.len(), 4);
        assert_eq!(upcoming[0].appointment_time, time(9, 30));
    });
}
