//! Example demonstrating admission under contention
//!
//! This example shows how to:
//! 1. Share one `QueueEngine` between many tokio tasks
//! 2. Race more public bookings than a session has slots
//! 3. Observe admissions through a `QueueEventListener`
//! 4. Check that the issued numbers are exactly 1..=capacity

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};
use walkin_queue::prelude::*;
use walkin_queue::{QueueConfig, RateLimitConfig};

const CAPACITY: u32 = 40;
const CALLERS: usize = 100;

#[tokio::main(flavor = "multi_thread", worker_threads = 8)]
async fn main() {
    tracing_subscriber::fmt::init();
    info!("Concurrent Booking Example");

    let admitted_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&admitted_events);
    let listener: QueueEventListener = Arc::new(move |event: &QueueEvent| {
        if let QueueEvent::TokenAdmitted { .. } = event {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    let engine = match QueueEngine::builder()
        .with_config(
            QueueConfig::default().with_booking_rate_limit(RateLimitConfig::new(2, 10)),
        )
        .with_event_listener(listener)
        .build()
    {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            warn!("Invalid configuration: {}", e);
            return;
        }
    };

    let today = SystemClock.today();
    let session = match engine.registry().create_session(NewSession::new(
        ChamberId::new(),
        DoctorId::new(),
        today,
        chrono::NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
        chrono::NaiveTime::from_hms_opt(21, 0, 0).expect("valid time"),
        CAPACITY,
    )) {
        Ok(session) => session,
        Err(e) => {
            warn!("Could not create session: {}", e);
            return;
        }
    };
    info!("Session {} with {} slots, {} callers", session.id, CAPACITY, CALLERS);

    let mut handles = Vec::with_capacity(CALLERS);
    for i in 0..CALLERS {
        let engine = Arc::clone(&engine);
        let session_id = session.id;
        handles.push(tokio::spawn(async move {
            let request = BookingRequest::new(
                session_id,
                PatientDetails::new(format!("Caller {i}"), format!("01900{i:06}")),
            );
            engine
                .booking()
                .book_public(&format!("203.0.113.{}", i % 250), request)
                .await
        }));
    }

    let mut numbers = BTreeSet::new();
    let mut full = 0;
    let mut other = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(receipt)) => {
                numbers.insert(receipt.token_number);
            }
            Ok(Err(QueueError::SessionFull { .. })) => full += 1,
            Ok(Err(e)) => {
                warn!("booking failed: {}", e);
                other += 1;
            }
            Err(e) => {
                warn!("task failed: {}", e);
                other += 1;
            }
        }
    }

    let contiguous = numbers.iter().copied().eq(1..=numbers.len() as u32);
    info!(
        "admitted {} (contiguous: {}), full {}, other errors {}",
        numbers.len(),
        contiguous,
        full,
        other
    );
    info!(
        "listener saw {} admissions",
        admitted_events.load(Ordering::Relaxed)
    );

    match engine.registry().occupancy(session.id) {
        Ok(occupancy) => info!(
            "occupancy: {} waiting, {} remaining",
            occupancy.waiting, occupancy.remaining
        ),
        Err(e) => warn!("occupancy failed: {}", e),
    }
}
