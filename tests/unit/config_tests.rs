#[cfg(test)]
mod tests_config {
    use crate::common::{builder, clock, engine_with, evening_session};
    use std::collections::HashMap;
    use walkin_queue::{ConfigError, QueueConfig, RateLimitConfig};

    #[test]
    fn builder_rejects_invalid_config() {
        let clock = clock();
        let config = QueueConfig::default().with_lookup_rate_limit(RateLimitConfig::new(0, 10));
        let result = builder(&clock).with_config(config).build();
        assert!(matches!(result, Err(ConfigError::InvalidRateLimit(_))));
    }

    #[test]
    fn default_consultation_minutes_flow_into_new_sessions() {
        let clock = clock();
        let config = QueueConfig::default().with_default_avg_consultation_minutes(12);
        let engine = engine_with(&clock, config);

        let implicit = engine
            .registry()
            .create_session(evening_session(5))
            .expect("session");
        assert_eq!(implicit.avg_consultation_minutes, 12);

        let explicit = engine
            .registry()
            .create_session(evening_session(5).with_avg_consultation_minutes(4))
            .expect("session");
        assert_eq!(explicit.avg_consultation_minutes, 4);
    }

    #[test]
    fn json_document_drives_the_engine() {
        let clock = clock();
        let config = QueueConfig::from_json(
            r#"{
                "admission_timeout_ms": 250,
                "booking_rate_limit": { "burst": 3, "refill_per_minute": 6 }
            }"#,
        )
        .expect("config");
        assert_eq!(config.booking_rate_limit, RateLimitConfig::new(3, 6));
        assert_eq!(config.lookup_rate_limit, RateLimitConfig::lookup_default());

        let engine = engine_with(&clock, config.clone());
        assert_eq!(engine.config(), &config);
    }

    #[test]
    fn json_document_is_validated() {
        let err = QueueConfig::from_json(r#"{"progression_timeout_ms": 0}"#)
            .expect_err("zero timeout");
        assert!(matches!(err, ConfigError::InvalidTimeout(_)));
        assert!(err.to_string().contains("progression_timeout_ms"));
    }

    #[test]
    fn environment_style_variables() {
        let vars = HashMap::from([
            ("WALKIN_QUEUE_LOOKUP_BURST".to_string(), "40".to_string()),
            (
                "WALKIN_QUEUE_LOOKUP_REFILL_PER_MINUTE".to_string(),
                "60".to_string(),
            ),
            ("UNRELATED".to_string(), "ignored".to_string()),
        ]);
        let config = QueueConfig::from_vars(&vars).expect("config");
        assert_eq!(config.lookup_rate_limit, RateLimitConfig::new(40, 60));
        assert_eq!(config.booking_rate_limit, RateLimitConfig::booking_default());

        let vars = HashMap::from([(
            "WALKIN_QUEUE_AVG_CONSULTATION_MINUTES".to_string(),
            "-5".to_string(),
        )]);
        assert!(matches!(
            QueueConfig::from_vars(&vars),
            Err(ConfigError::InvalidConsultationMinutes(_))
        ));
    }
}
