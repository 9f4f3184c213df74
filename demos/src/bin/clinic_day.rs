// demos/src/bin/clinic_day.rs
//
// An evening at a small chamber: the front desk and the public widget book
// patients, the doctor works through the line, and patients poll the status
// page in between.
//
// Functions demonstrated:
// - `create_session()` / `set_status()` / `set_booking_open()`
// - `book_public()` and `book_staff()` with wait estimates
// - `advance()`, `cancel()` and `complete()`
// - `lookup()` on the public status page, including `AlreadyServed`
// - snapshot export
//
// Run this example with:
//   cargo run --bin clinic_day
//   (from the demos directory)

use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{info, warn};
use walkin_queue::prelude::*;
use walkin_queue::{ChamberProfile, DoctorProfile, InMemoryChamberDirectory, InMemoryPatientDirectory};

const PATIENTS: [(&str, &str); 6] = [
    ("Ayesha Rahman", "01711-111111"),
    ("Karim Uddin", "01712 222222"),
    ("Nadia Islam", "01713333333"),
    ("Rafiq Ahmed", "01714-444444"),
    ("Sumaiya Akter", "01715555555"),
    ("Tanvir Hasan", "01716 666666"),
];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    info!("Clinic Day Example");

    let date = NaiveDate::from_ymd_opt(2025, 6, 2).expect("valid date");
    let clock = Arc::new(ManualClock::new(date.and_hms_opt(9, 0, 0).expect("valid time")));
    let chamber = ChamberId::new();
    let doctor = DoctorId::new();

    let chambers = Arc::new(InMemoryChamberDirectory::new());
    chambers.add_chamber(ChamberProfile {
        id: chamber,
        name: "Green Life Chamber".to_string(),
        address: Some("House 12, Road 5, Dhanmondi".to_string()),
        phone: None,
    });
    chambers.add_doctor(DoctorProfile {
        id: doctor,
        name: "Dr. Rahman".to_string(),
        specialization: Some("Medicine".to_string()),
    });

    let engine = QueueEngine::builder()
        .with_clock(clock.clone())
        .with_chamber_directory(chambers)
        .with_patient_directory(Arc::new(InMemoryPatientDirectory::new()))
        .build()
        .expect("default config is valid");

    let session = engine
        .registry()
        .create_session(
            NewSession::new(
                chamber,
                doctor,
                date,
                NaiveTime::from_hms_opt(17, 0, 0).expect("valid time"),
                NaiveTime::from_hms_opt(20, 0, 0).expect("valid time"),
                5,
            )
            .with_avg_consultation_minutes(12),
        )
        .expect("valid session");
    info!(
        "\n=== Session {} on {} {}-{}, capacity {} ===",
        session.id, session.date, session.start_time, session.end_time, session.max_patients
    );

    book_patients(&engine, session.id).await;
    run_evening(&engine, &clock, session.id, date).await;

    match engine.snapshot_to_json().await {
        Ok(json) => info!("\nSnapshot export: {} bytes", json.len()),
        Err(e) => warn!("Snapshot export failed: {}", e),
    }
}

async fn book_patients(engine: &QueueEngine, session_id: SessionId) {
    info!("\n=== Booking ===");
    for (i, (name, phone)) in PATIENTS.iter().enumerate() {
        let request = BookingRequest::new(session_id, PatientDetails::new(*name, *phone));
        let result = if i % 2 == 0 {
            engine
                .booking()
                .book_public(&format!("198.51.100.{i}"), request)
                .await
        } else {
            engine
                .booking()
                .book_staff(request.with_reason("follow-up"))
                .await
        };

        match result {
            Ok(receipt) => info!(
                "{:<14} token #{} ({} ahead, expected around {})",
                name,
                receipt.token_number,
                receipt.estimate.patients_ahead,
                receipt.estimate.expected_call_time.time()
            ),
            Err(e) => warn!("{:<14} not booked: {}", name, e.public_message()),
        }
    }

    if let Ok(occupancy) = engine.registry().occupancy(session_id) {
        info!(
            "Booked {} of {}, {} remaining",
            occupancy.waiting, occupancy.capacity, occupancy.remaining
        );
    }
}

async fn run_evening(
    engine: &QueueEngine,
    clock: &ManualClock,
    session_id: SessionId,
    date: NaiveDate,
) {
    info!("\n=== Evening ===");
    clock.set(date.and_hms_opt(17, 5, 0).expect("valid time"));
    if let Err(e) = engine
        .registry()
        .set_status(session_id, SessionStatus::Running)
    {
        warn!("Could not start session: {}", e);
        return;
    }
    if let Err(e) = engine.registry().set_booking_open(session_id, false) {
        warn!("Could not close booking: {}", e);
    }

    poll(engine, "01713333333").await;

    for step in 0..3 {
        match engine.controller().advance(session_id).await {
            Ok(advance) => info!(
                "advance {}: completed {:?}, now serving {:?}",
                step,
                advance.completed.map(|t| t.token_number),
                advance.called.map(|t| t.token_number)
            ),
            Err(e) => warn!("advance failed: {}", e),
        }
        poll(engine, "01713333333").await;
        clock.advance_minutes(12);
    }

    // Patient #4 went home.
    if let Ok(tokens) = engine.controller().tokens(session_id) {
        if let Some(token) = tokens.iter().find(|t| t.token_number == 4) {
            match engine.controller().cancel(token.id).await {
                Ok(cancelled) => info!("token #{} cancelled", cancelled.token_number),
                Err(e) => warn!("cancel failed: {}", e),
            }
        }
    }

    loop {
        match engine.controller().advance(session_id).await {
            Ok(advance) if advance.called.is_none() => break,
            Ok(advance) => info!(
                "now serving {:?}",
                advance.called.map(|t| t.token_number)
            ),
            Err(QueueError::QueueEmpty(_)) => break,
            Err(e) => {
                warn!("advance failed: {}", e);
                break;
            }
        }
        clock.advance_minutes(12);
    }

    poll(engine, "01711-111111").await;
    if let Err(e) = engine
        .registry()
        .set_status(session_id, SessionStatus::Closed)
    {
        warn!("Could not close session: {}", e);
    }
}

async fn poll(engine: &QueueEngine, phone: &str) {
    match engine.status().lookup("status-page", StatusQuery::new(phone)).await {
        Ok(view) => info!(
            "status {}: token #{} {}, now serving {:?}, {} ahead, ~{} min ({:?}) at {}",
            phone,
            view.token_number,
            view.token_status,
            view.current_token_number,
            view.estimate.patients_ahead,
            view.estimate.estimated_wait_minutes,
            view.estimate.mode,
            view.doctor.map(|d| d.name).unwrap_or_default()
        ),
        Err(e) => info!("status {}: {}", phone, e.public_message()),
    }
}
