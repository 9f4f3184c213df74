#[cfg(test)]
mod tests_lookup {
    use crate::common::{
        CHAMBER, DOCTOR, FaultyStore, at, book_many, booking, builder, clock, day, engine,
        engine_with, evening_session, open_session, phone,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use walkin_queue::{
        ChamberProfile, DoctorProfile, EstimateMode, InMemoryChamberDirectory, NewSession,
        QueueConfig, QueueError, RateLimitConfig, SessionStatus, StatusQuery, TokenStatus,
    };

    #[tokio::test]
    async fn unknown_phone_is_not_found() {
        let clock = clock();
        let engine = engine(&clock);
        let session_id = open_session(&engine, 5);
        book_many(&engine, session_id, 2).await;

        assert_eq!(
            engine
                .status()
                .lookup("203.0.113.1", StatusQuery::new("01999999999"))
                .await,
            Err(QueueError::NotFound)
        );
        assert_eq!(
            engine.status().lookup("203.0.113.1", StatusQuery::new("  ")).await,
            Err(QueueError::NotFound)
        );
    }

    #[tokio::test]
    async fn lookup_normalizes_the_phone_and_reports_the_queue() {
        let clock = clock();
        let engine = engine(&clock);
        let session_id = open_session(&engine, 5);
        book_many(&engine, session_id, 3).await;

        let view = engine
            .status()
            .lookup("203.0.113.1", StatusQuery::new("0180-0000 002"))
            .await
            .expect("lookup");
        assert_eq!(view.session_id, session_id);
        assert_eq!(view.token_number, 3);
        assert_eq!(view.token_status, TokenStatus::Waiting);
        assert_eq!(view.session_status, SessionStatus::Open);
        assert_eq!(view.current_token_number, None);
        assert_eq!(view.start_time, at(17, 0));
        assert_eq!(view.estimate.mode, EstimateMode::PreSession);
        assert_eq!(view.estimate.patients_ahead, 2);
        assert_eq!(view.estimate.expected_call_time, day().and_time(at(17, 20)));
        assert!(view.chamber.is_none());
    }

    #[tokio::test]
    async fn completed_booking_is_already_served() {
        let clock = clock();
        let engine = engine(&clock);
        let session_id = open_session(&engine, 5);
        book_many(&engine, session_id, 2).await;
        engine.controller().advance(session_id).await.expect("call #1");
        engine.controller().advance(session_id).await.expect("call #2");

        let err = engine
            .status()
            .lookup("203.0.113.1", StatusQuery::new(phone(0)))
            .await
            .expect_err("served");
        assert_eq!(
            err,
            QueueError::AlreadyServed {
                token_number: 1,
                status: TokenStatus::Completed
            }
        );
        assert!(!err.is_retryable());

        let view = engine
            .status()
            .lookup("203.0.113.1", StatusQuery::new(phone(1)))
            .await
            .expect("current patient");
        assert_eq!(view.token_status, TokenStatus::Current);
        assert_eq!(view.estimate.patients_ahead, 0);
    }

    #[tokio::test]
    async fn cancelled_booking_is_already_served() {
        let clock = clock();
        let engine = engine(&clock);
        let session_id = open_session(&engine, 5);
        book_many(&engine, session_id, 1).await;
        let token = engine.controller().tokens(session_id).expect("tokens")[0].clone();
        engine.controller().cancel(token.id).await.expect("cancel");

        assert_eq!(
            engine
                .status()
                .lookup("203.0.113.1", StatusQuery::new(phone(0)))
                .await,
            Err(QueueError::AlreadyServed {
                token_number: 1,
                status: TokenStatus::Cancelled
            })
        );
    }

    #[tokio::test]
    async fn active_booking_wins_over_earlier_served_one() {
        let clock = clock();
        let engine = engine(&clock);
        let morning = engine
            .registry()
            .create_session(NewSession::new(CHAMBER, DOCTOR, day(), at(9, 0), at(12, 0), 5))
            .expect("morning")
            .id;
        let evening = open_session(&engine, 5);

        engine
            .booking()
            .book_staff(booking(morning, 4))
            .await
            .expect("morning booking");
        engine.controller().advance(morning).await.expect("call");
        engine.controller().advance(morning).await.expect("complete");

        book_many(&engine, evening, 5).await;
        let view = engine
            .status()
            .lookup("203.0.113.1", StatusQuery::new(phone(4)))
            .await
            .expect("evening booking");
        assert_eq!(view.session_id, evening);
        assert_eq!(view.token_number, 5);
    }

    #[tokio::test]
    async fn token_number_and_date_narrow_the_match() {
        let clock = clock();
        let engine = engine(&clock);
        let session_id = open_session(&engine, 5);
        engine
            .booking()
            .book_staff(booking(session_id, 1))
            .await
            .expect("first");
        engine
            .booking()
            .book_staff(booking(session_id, 1))
            .await
            .expect("second, same phone");

        let by_number = engine
            .status()
            .lookup("203.0.113.1", StatusQuery::new(phone(1)).with_token(2))
            .await
            .expect("second token");
        assert_eq!(by_number.token_number, 2);

        let default = engine
            .status()
            .lookup("203.0.113.1", StatusQuery::new(phone(1)))
            .await
            .expect("earliest active");
        assert_eq!(default.token_number, 1);

        let tomorrow = day().succ_opt().expect("next day");
        assert_eq!(
            engine
                .status()
                .lookup("203.0.113.1", StatusQuery::new(phone(1)).on(tomorrow))
                .await,
            Err(QueueError::NotFound)
        );
        assert_eq!(
            engine
                .status()
                .lookup("203.0.113.1", StatusQuery::new(phone(1)).with_token(9))
                .await,
            Err(QueueError::NotFound)
        );
    }

    #[tokio::test]
    async fn live_mode_once_the_doctor_calls() {
        let clock = clock();
        let engine = engine(&clock);
        let session_id = engine
            .registry()
            .create_session(evening_session(10).with_avg_consultation_minutes(5))
            .expect("session")
            .id;
        book_many(&engine, session_id, 5).await;
        engine
            .registry()
            .set_status(session_id, SessionStatus::Running)
            .expect("running");
        clock.set(day().and_time(at(17, 12)));
        engine.controller().advance(session_id).await.expect("#1");
        engine.controller().advance(session_id).await.expect("#2");

        let view = engine
            .status()
            .lookup("203.0.113.1", StatusQuery::new(phone(4)))
            .await
            .expect("lookup");
        assert_eq!(view.current_token_number, Some(2));
        assert_eq!(view.estimate.mode, EstimateMode::Live);
        assert_eq!(view.estimate.patients_ahead, 2);
        assert_eq!(view.estimate.estimated_wait_minutes, 10);
        assert_eq!(view.estimate.expected_call_time, day().and_time(at(17, 22)));
        assert_eq!(view.estimate.scheduled_call_time, day().and_time(at(17, 20)));
    }

    #[tokio::test]
    async fn lookups_are_rate_limited_per_client() {
        let clock = clock();
        let config = QueueConfig::default().with_lookup_rate_limit(RateLimitConfig::new(3, 1));
        let engine = engine_with(&clock, config);
        let session_id = open_session(&engine, 5);
        book_many(&engine, session_id, 1).await;

        for _ in 0..3 {
            engine
                .status()
                .lookup("poller", StatusQuery::new(phone(0)))
                .await
                .expect("within burst");
        }
        let err = engine
            .status()
            .lookup("poller", StatusQuery::new(phone(0)))
            .await
            .expect_err("limited");
        match err {
            QueueError::RateLimited { retry_after_secs } => assert!(retry_after_secs >= 1),
            other => panic!("expected RateLimited, got {other}"),
        }
        engine
            .status()
            .lookup("another-poller", StatusQuery::new(phone(0)))
            .await
            .expect("separate bucket");
    }

    #[tokio::test]
    async fn chamber_directory_fills_descriptive_fields() {
        let clock = clock();
        let chambers = Arc::new(InMemoryChamberDirectory::new());
        chambers.add_chamber(ChamberProfile {
            id: CHAMBER,
            name: "Green Life Chamber".to_string(),
            address: Some("House 12, Road 5, Dhanmondi".to_string()),
            phone: Some("0255000000".to_string()),
        });
        chambers.add_doctor(DoctorProfile {
            id: DOCTOR,
            name: "Dr. Rahman".to_string(),
            specialization: Some("Medicine".to_string()),
        });
        let engine = builder(&clock)
            .with_chamber_directory(chambers)
            .build()
            .expect("engine");
        let session_id = open_session(&engine, 5);
        book_many(&engine, session_id, 1).await;

        let view = engine
            .status()
            .lookup("203.0.113.1", StatusQuery::new(phone(0)))
            .await
            .expect("lookup");
        assert_eq!(
            view.chamber.map(|c| c.name),
            Some("Green Life Chamber".to_string())
        );
        assert_eq!(view.doctor.map(|d| d.name), Some("Dr. Rahman".to_string()));
    }

    #[tokio::test]
    async fn lookup_config_timeout_is_applied() {
        let clock = clock();
        let config = QueueConfig::default().with_lookup_timeout(Duration::from_millis(750));
        let engine = engine_with(&clock, config);
        assert_eq!(
            engine.config().lookup_timeout(),
            Duration::from_millis(750)
        );
        let session_id = open_session(&engine, 5);
        book_many(&engine, session_id, 1).await;
        engine
            .status()
            .lookup("203.0.113.1", StatusQuery::new(phone(0)))
            .await
            .expect("fast lookup well within deadline");
    }

    #[tokio::test]
    async fn slow_store_surfaces_as_network_error() {
        let clock = clock();
        let engine = builder(&clock)
            .with_config(QueueConfig::default().with_lookup_timeout(Duration::from_millis(50)))
            .with_store(Arc::new(FaultyStore::slow_phone_lookups(
                Duration::from_millis(400),
            )))
            .build()
            .expect("engine");
        let session_id = open_session(&engine, 5);
        book_many(&engine, session_id, 1).await;

        let err = engine
            .status()
            .lookup("203.0.113.1", StatusQuery::new(phone(0)))
            .await
            .expect_err("deadline exceeded");
        assert_eq!(err, QueueError::NetworkError);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn storage_fault_surfaces_as_network_error() {
        let clock = clock();
        let engine = builder(&clock)
            .with_store(Arc::new(FaultyStore::failing_phone_lookups()))
            .build()
            .expect("engine");
        let session_id = open_session(&engine, 5);
        book_many(&engine, session_id, 1).await;

        let err = engine
            .status()
            .lookup("203.0.113.1", StatusQuery::new(phone(0)))
            .await
            .expect_err("storage down");
        assert_eq!(err, QueueError::NetworkError);
        assert!(!err.to_string().contains("phone index"));
    }

    #[tokio::test]
    async fn lookup_answers_pass_through_a_custom_store() {
        let clock = clock();
        let engine = builder(&clock)
            .with_store(Arc::new(FaultyStore::default()))
            .build()
            .expect("engine");
        let session_id = open_session(&engine, 5);
        book_many(&engine, session_id, 2).await;
        engine.controller().advance(session_id).await.expect("call #1");
        engine.controller().advance(session_id).await.expect("call #2");

        assert_eq!(
            engine
                .status()
                .lookup("203.0.113.1", StatusQuery::new("01999999999"))
                .await,
            Err(QueueError::NotFound)
        );
        assert_eq!(
            engine
                .status()
                .lookup("203.0.113.1", StatusQuery::new(phone(0)))
                .await,
            Err(QueueError::AlreadyServed {
                token_number: 1,
                status: TokenStatus::Completed
            })
        );
    }
}
