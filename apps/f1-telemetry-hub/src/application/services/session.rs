//! Session Resolver
//!
//! Finds the session the hub should stream and looks sessions up by key.

use std::sync::Arc;

use chrono::{Datelike, Utc};

use crate::application::ports::{Endpoint, QueryParams, UpstreamPort};
use crate::domain::timing::{SessionRecord, decode_records};

/// Resolves sessions through the upstream port.
#[derive(Clone)]
pub struct SessionResolver {
    upstream: Arc<dyn UpstreamPort>,
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver").finish_non_exhaustive()
    }
}

impl SessionResolver {
    /// Create a resolver over `upstream`.
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamPort>) -> Self {
        Self { upstream }
    }

    /// The latest session.
    ///
    /// Asks for `session_key=latest` first and falls back to the session of
    /// the current year with the greatest start date.
    pub async fn current_session(&self) -> Option<SessionRecord> {
        let latest = self
            .first_session(&QueryParams::new().with("session_key", "latest"))
            .await;
        if let Some(session) = latest {
            tracing::debug!(
                session_key = session.session_key,
                session_name = session.session_name.as_deref(),
                "Resolved latest session"
            );
            return Some(session);
        }

        let year = Utc::now().year();
        let records = self
            .upstream
            .fetch(Endpoint::Sessions, &QueryParams::new().with("year", year))
            .await;
        let fallback = decode_records::<SessionRecord>(&records)
            .into_iter()
            .max_by_key(SessionRecord::started_at);

        if let Some(session) = &fallback {
            tracing::info!(
                year,
                session_key = session.session_key,
                session_name = session.session_name.as_deref(),
                "Resolved session from yearly listing"
            );
        }
        fallback
    }

    /// Look a session up by key.
    pub async fn session_by_key(&self, session_key: &str) -> Option<SessionRecord> {
        self.first_session(&QueryParams::session(session_key)).await
    }

    async fn first_session(&self, params: &QueryParams) -> Option<SessionRecord> {
        let records = self.upstream.fetch(Endpoint::Sessions, params).await;
        decode_records::<SessionRecord>(&records).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use serde_json::json;

    use super::*;
    use crate::application::ports::MockUpstreamPort;

    #[tokio::test]
    async fn latest_session_is_preferred() {
        let mut mock = MockUpstreamPort::new();
        mock.expect_fetch()
            .with(
                eq(Endpoint::Sessions),
                eq(QueryParams::new().with("session_key", "latest")),
            )
            .times(1)
            .returning(|_, _| vec![json!({"session_key": 9158, "session_name": "Race"})]);

        let session = SessionResolver::new(Arc::new(mock))
            .current_session()
            .await
            .unwrap();

        assert_eq!(session.session_key, Some(9158));
        assert_eq!(session.session_name.as_deref(), Some("Race"));
    }

    #[tokio::test]
    async fn falls_back_to_most_recent_of_the_year() {
        let year = Utc::now().year();
        let mut mock = MockUpstreamPort::new();
        mock.expect_fetch()
            .with(
                eq(Endpoint::Sessions),
                eq(QueryParams::new().with("session_key", "latest")),
            )
            .returning(|_, _| vec![]);
        mock.expect_fetch()
            .with(eq(Endpoint::Sessions), eq(QueryParams::new().with("year", year)))
            .returning(|_, _| {
                vec![
                    json!({"session_key": 1, "date_start": "2024-03-01T12:00:00+00:00"}),
                    json!({"session_key": 3, "date_start": "2024-03-03T15:00:00+00:00"}),
                    json!({"session_key": 2, "date_start": "2024-03-02T12:00:00+00:00"}),
                ]
            });

        let session = SessionResolver::new(Arc::new(mock))
            .current_session()
            .await
            .unwrap();

        assert_eq!(session.session_key, Some(3));
    }

    #[tokio::test]
    async fn no_session_anywhere() {
        let mut mock = MockUpstreamPort::new();
        mock.expect_fetch().returning(|_, _| vec![]);

        assert!(SessionResolver::new(Arc::new(mock)).current_session().await.is_none());
    }

    #[tokio::test]
    async fn session_by_key_takes_first_record() {
        let mut mock = MockUpstreamPort::new();
        mock.expect_fetch()
            .with(eq(Endpoint::Sessions), eq(QueryParams::session("7763")))
            .returning(|_, _| vec![json!({"session_key": 7763, "circuit_short_name": "Monza"})]);

        let session = SessionResolver::new(Arc::new(mock))
            .session_by_key("7763")
            .await
            .unwrap();

        assert_eq!(session.circuit_short_name.as_deref(), Some("Monza"));
    }
}
