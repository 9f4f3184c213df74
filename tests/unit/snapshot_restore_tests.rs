#[cfg(test)]
mod tests_snapshot_restore {
    use crate::common::{
        FaultyStore, book_many, booking, builder, clock, engine, open_session, phone,
    };
    use std::sync::Arc;
    use walkin_queue::{
        QUEUE_SNAPSHOT_FORMAT_VERSION, QueueError, QueueSnapshot, QueueSnapshotPackage,
        StatusQuery, TokenStatus,
    };

    #[tokio::test]
    async fn snapshot_package_round_trip_restores_the_queue() {
        let clock = clock();
        let original = engine(&clock);
        let session_id = open_session(&original, 10);
        book_many(&original, session_id, 4).await;
        original.controller().advance(session_id).await.expect("#1");
        original.controller().advance(session_id).await.expect("#2");
        let tokens = original.controller().tokens(session_id).expect("tokens");
        original.controller().cancel(tokens[3].id).await.expect("cancel #4");

        let json = original.snapshot_to_json().await.expect("export");
        let package = QueueSnapshotPackage::from_json(&json).expect("parse");
        assert_eq!(package.version, QUEUE_SNAPSHOT_FORMAT_VERSION);
        assert_eq!(package.snapshot.active_tokens(), 2);

        let restored = engine(&clock);
        restored.restore_from_json(&json).expect("restore");

        let session = restored.registry().get_session(session_id).expect("session");
        assert_eq!(session.current_token_number(), Some(2));
        assert_eq!(session.last_token_number, 4);
        let statuses: Vec<TokenStatus> = restored
            .controller()
            .tokens(session_id)
            .expect("tokens")
            .iter()
            .map(|t| t.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                TokenStatus::Completed,
                TokenStatus::Current,
                TokenStatus::Waiting,
                TokenStatus::Cancelled
            ]
        );

        let view = restored
            .status()
            .lookup("203.0.113.1", StatusQuery::new(phone(2)))
            .await
            .expect("phone index rebuilt");
        assert_eq!(view.token_number, 3);

        let receipt = restored
            .booking()
            .book_staff(booking(session_id, 9))
            .await
            .expect("admission after restore");
        assert_eq!(receipt.token_number, 5);

        let step = restored.controller().advance(session_id).await.expect("advance");
        assert_eq!(step.completed.map(|t| t.token_number), Some(2));
        assert_eq!(step.called.map(|t| t.token_number), Some(3));
    }

    #[tokio::test]
    async fn restore_requires_an_empty_store() {
        let clock = clock();
        let source = engine(&clock);
        let session_id = open_session(&source, 3);
        book_many(&source, session_id, 1).await;
        let package = source.snapshot_package().await.expect("package");

        let err = source
            .restore_from_package(package)
            .expect_err("store already holds sessions");
        assert!(matches!(err, QueueError::InvalidOperation { .. }));
    }

    #[tokio::test]
    async fn tampered_package_is_rejected() {
        let clock = clock();
        let source = engine(&clock);
        let session_id = open_session(&source, 3);
        book_many(&source, session_id, 2).await;

        let mut package = source.snapshot_package().await.expect("package");
        package.snapshot.tokens[0].status = TokenStatus::Completed;
        assert!(matches!(
            package.validate(),
            Err(QueueError::ChecksumMismatch { .. })
        ));

        let target = engine(&clock);
        assert!(matches!(
            target.restore_from_package(package),
            Err(QueueError::ChecksumMismatch { .. })
        ));
        assert!(target.snapshot().await.expect("snapshot").sessions.is_empty());
    }

    #[tokio::test]
    async fn unsupported_version_is_rejected() {
        let clock = clock();
        let source = engine(&clock);
        open_session(&source, 3);

        let mut package = source.snapshot_package().await.expect("package");
        package.version = QUEUE_SNAPSHOT_FORMAT_VERSION + 1;
        let err = package.validate().expect_err("future version");
        assert!(err.to_string().contains("Unsupported snapshot version"));
    }

    #[tokio::test]
    async fn inconsistent_rows_fail_integrity_even_with_valid_checksum() {
        let clock = clock();
        let source = engine(&clock);
        let session_id = open_session(&source, 5);
        book_many(&source, session_id, 2).await;

        let snapshot = source.snapshot().await.expect("snapshot");
        let mut tokens = snapshot.tokens.clone();
        tokens[1].token_number = tokens[0].token_number;
        let duplicate = QueueSnapshot::new(snapshot.timestamp, snapshot.sessions.clone(), tokens);
        let package = QueueSnapshotPackage::new(duplicate).expect("package");
        assert!(matches!(
            package.validate(),
            Err(QueueError::InvalidOperation { .. })
        ));

        let mut tokens = snapshot.tokens.clone();
        tokens[0].status = TokenStatus::Current;
        let dangling = QueueSnapshot::new(snapshot.timestamp, snapshot.sessions, tokens);
        let err = QueueSnapshotPackage::new(dangling)
            .expect("package")
            .into_snapshot()
            .expect_err("pointer does not match");
        assert!(err.to_string().contains("current pointer"));
    }

    #[tokio::test]
    async fn shared_token_id_is_rejected_before_loading() {
        let clock = clock();
        let source = engine(&clock);
        let session_id = open_session(&source, 5);
        book_many(&source, session_id, 2).await;
        let snapshot = source.snapshot().await.expect("snapshot");

        let mut tokens = snapshot.tokens.clone();
        tokens[1].id = tokens[0].id;
        let shared = QueueSnapshot::new(snapshot.timestamp, snapshot.sessions.clone(), tokens);
        let package = QueueSnapshotPackage::new(shared).expect("package");
        assert!(matches!(
            package.validate(),
            Err(QueueError::InvalidOperation { .. })
        ));

        let target = engine(&clock);
        assert!(target.restore_from_package(package).is_err());
        assert!(target.snapshot().await.expect("snapshot").sessions.is_empty());

        let good = QueueSnapshotPackage::new(snapshot).expect("package");
        target.restore_from_package(good).expect("restore into untouched store");
        assert_eq!(target.controller().tokens(session_id).expect("tokens").len(), 2);
    }

    #[tokio::test]
    async fn failed_restore_unloads_partial_rows() {
        let clock = clock();
        let source = engine(&clock);
        let session_id = open_session(&source, 5);
        book_many(&source, session_id, 3).await;
        let package = source.snapshot_package().await.expect("package");

        let target = builder(&clock)
            .with_store(Arc::new(FaultyStore::failing_token_insert(2)))
            .build()
            .expect("engine");
        let err = target
            .restore_from_package(package.clone())
            .expect_err("second token insert fails");
        assert!(matches!(err, QueueError::Storage { .. }));
        assert!(target.snapshot().await.expect("snapshot").sessions.is_empty());
        assert_eq!(
            target
                .status()
                .lookup("203.0.113.1", StatusQuery::new(phone(0)))
                .await,
            Err(QueueError::NotFound)
        );

        target.restore_from_package(package).expect("retry succeeds");
        let session = target.registry().get_session(session_id).expect("session");
        assert_eq!(session.last_token_number, 3);
        assert_eq!(target.controller().tokens(session_id).expect("tokens").len(), 3);
    }
}
