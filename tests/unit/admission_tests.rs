#[cfg(test)]
mod tests_admission {
    use crate::common::{
        book_many, booking, clock, engine, engine_with, evening_session, open_session,
    };
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use walkin_queue::{
        ChamberId, ErrorCategory, InMemoryPatientDirectory, PatientDetails, PatientDirectory,
        PatientId, QueueConfig, QueueEngine, QueueError, RateLimitConfig, SessionStatus,
        TokenStatus,
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_slots_admit_two_and_reject_the_third() {
        let clock = clock();
        let engine = Arc::new(engine(&clock));
        let session_id = open_session(&engine, 2);

        let mut handles = Vec::new();
        for i in 0..3 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                let client = format!("client-{i}");
                engine
                    .booking()
                    .book_public(&client, booking(session_id, i))
                    .await
            }));
        }

        let mut numbers = BTreeSet::new();
        let mut errors = Vec::new();
        for handle in handles {
            match handle.await.expect("task") {
                Ok(receipt) => {
                    numbers.insert(receipt.token_number);
                }
                Err(error) => errors.push(error),
            }
        }
        assert_eq!(numbers, BTreeSet::from([1, 2]));
        assert_eq!(
            errors,
            vec![QueueError::SessionFull {
                session_id,
                capacity: 2
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn capacity_and_contiguity_hold_for_many_shapes() {
        for (capacity, attempts) in [(1u32, 8usize), (5, 5), (7, 20), (25, 40)] {
            let clock = clock();
            let engine = Arc::new(engine(&clock));
            let session_id = open_session(&engine, capacity);

            let mut handles = Vec::new();
            for i in 0..attempts {
                let engine = Arc::clone(&engine);
                handles.push(tokio::spawn(async move {
                    engine.booking().book_staff(booking(session_id, i)).await
                }));
            }

            let mut numbers = Vec::new();
            for handle in handles {
                match handle.await.expect("task") {
                    Ok(receipt) => numbers.push(receipt.token_number),
                    Err(QueueError::SessionFull { .. }) => {}
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
            numbers.sort_unstable();
            let expected_len = attempts.min(capacity as usize) as u32;
            assert_eq!(numbers, (1..=expected_len).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn closed_booking_rejects_despite_free_capacity() {
        let clock = clock();
        let engine = engine(&clock);
        let session_id = open_session(&engine, 10);

        engine
            .registry()
            .set_booking_open(session_id, false)
            .expect("close booking");
        let err = engine
            .booking()
            .book_public("client", booking(session_id, 0))
            .await
            .expect_err("booking closed");
        assert_eq!(err, QueueError::BookingClosed(session_id));
        assert_eq!(err.category(), ErrorCategory::Admission);
        assert!(!err.is_retryable());

        let occupancy = engine.registry().occupancy(session_id).expect("occupancy");
        assert_eq!(occupancy.remaining, 10);
    }

    #[tokio::test]
    async fn running_session_with_open_booking_still_admits() {
        let clock = clock();
        let engine = engine(&clock);
        let session_id = open_session(&engine, 3);
        engine
            .registry()
            .set_status(session_id, SessionStatus::Running)
            .expect("running");
        assert_eq!(book_many(&engine, session_id, 1).await, vec![1]);

        engine
            .registry()
            .set_status(session_id, SessionStatus::Closed)
            .expect("closed");
        assert_eq!(
            engine.booking().book_staff(booking(session_id, 9)).await,
            Err(QueueError::SessionNotAcceptingNew(session_id))
        );
    }

    #[tokio::test]
    async fn cancellation_frees_capacity_without_reusing_numbers() {
        let clock = clock();
        let engine = engine(&clock);
        let session_id = open_session(&engine, 2);
        book_many(&engine, session_id, 2).await;

        let tokens = engine.controller().tokens(session_id).expect("tokens");
        engine
            .controller()
            .cancel(tokens[0].id)
            .await
            .expect("cancel");

        let receipt = engine
            .booking()
            .book_staff(booking(session_id, 5))
            .await
            .expect("slot freed by cancellation");
        assert_eq!(receipt.token_number, 3);

        let statuses: Vec<(u32, TokenStatus)> = engine
            .controller()
            .tokens(session_id)
            .expect("tokens")
            .iter()
            .map(|t| (t.token_number, t.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (1, TokenStatus::Cancelled),
                (2, TokenStatus::Waiting),
                (3, TokenStatus::Waiting)
            ]
        );
    }

    #[tokio::test]
    async fn capacity_cannot_drop_below_booked() {
        let clock = clock();
        let engine = engine(&clock);
        let session_id = open_session(&engine, 5);
        book_many(&engine, session_id, 3).await;

        assert_eq!(
            engine.registry().set_capacity(session_id, 2).await,
            Err(QueueError::CapacityBelowBooked {
                requested: 2,
                booked: 3
            })
        );
        let session = engine
            .registry()
            .set_capacity(session_id, 3)
            .await
            .expect("exactly booked");
        assert_eq!(session.max_patients, 3);
        assert!(matches!(
            engine.booking().book_staff(booking(session_id, 7)).await,
            Err(QueueError::SessionFull { capacity: 3, .. })
        ));
    }

    #[tokio::test]
    async fn public_booking_is_rate_limited_but_staff_is_not() {
        let clock = clock();
        let config = QueueConfig::default().with_booking_rate_limit(RateLimitConfig::new(2, 1));
        let engine = engine_with(&clock, config);
        let session_id = open_session(&engine, 20);

        for i in 0..2 {
            engine
                .booking()
                .book_public("198.51.100.9", booking(session_id, i))
                .await
                .expect("within burst");
        }
        let err = engine
            .booking()
            .book_public("198.51.100.9", booking(session_id, 2))
            .await
            .expect_err("over budget");
        assert!(matches!(err, QueueError::RateLimited { .. }));
        assert!(err.is_retryable());

        engine
            .booking()
            .book_public("198.51.100.10", booking(session_id, 3))
            .await
            .expect("other client has its own budget");
        assert_eq!(book_many(&engine, session_id, 3).await, vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn booking_requires_name_and_phone() {
        let clock = clock();
        let engine = engine(&clock);
        let session_id = open_session(&engine, 5);

        let mut request = booking(session_id, 0);
        request.patient.name = "   ".to_string();
        assert!(matches!(
            engine.booking().book_staff(request).await,
            Err(QueueError::InvalidOperation { .. })
        ));

        let mut request = booking(session_id, 0);
        request.patient.phone = "--".to_string();
        assert!(matches!(
            engine.booking().book_staff(request).await,
            Err(QueueError::InvalidOperation { .. })
        ));
        assert_eq!(
            engine.registry().occupancy(session_id).expect("occupancy").waiting,
            0
        );
    }

    #[tokio::test]
    async fn patient_upsert_links_one_record_per_phone() {
        let clock = clock();
        let directory = Arc::new(InMemoryPatientDirectory::new());
        let engine = crate::common::builder(&clock)
            .with_patient_directory(directory.clone())
            .build()
            .expect("engine");
        let session_id = open_session(&engine, 5);

        let first = engine
            .booking()
            .book_staff(booking(session_id, 1))
            .await
            .expect("first");
        let again = engine
            .booking()
            .book_staff(booking(session_id, 1))
            .await
            .expect("same phone again");

        assert!(first.patient_id.is_some());
        assert_eq!(first.patient_id, again.patient_id);
        assert_eq!(directory.len(), 1);
        let token = engine.controller().token(first.token_id).expect("token");
        assert_eq!(token.patient_id, first.patient_id);
    }

    struct FailingDirectory;

    impl PatientDirectory for FailingDirectory {
        fn upsert_patient(
            &self,
            _chamber_id: ChamberId,
            _patient: &PatientDetails,
        ) -> Result<PatientId, QueueError> {
            Err(QueueError::Collaborator {
                message: "patient service unavailable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn failing_patient_directory_keeps_the_token() {
        let clock = clock();
        let engine: QueueEngine = crate::common::builder(&clock)
            .with_patient_directory(Arc::new(FailingDirectory))
            .build()
            .expect("engine");
        let session_id = engine
            .registry()
            .create_session(evening_session(3))
            .expect("session")
            .id;

        let receipt = engine
            .booking()
            .book_staff(booking(session_id, 0))
            .await
            .expect("token committed");
        assert_eq!(receipt.token_number, 1);
        assert!(receipt.patient_id.is_none());
        assert_eq!(
            engine.registry().occupancy(session_id).expect("occupancy").waiting,
            1
        );
    }
}
