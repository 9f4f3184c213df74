//! Storage for the two queue tables, `queue_sessions` and `queue_tokens`.
//!
//! [`QueueStore`] is the persistence seam. It behaves like a row store with
//! single-row atomic updates and a uniqueness constraint on
//! `(session_id, token_number)`; it does not enforce business rules beyond
//! that. [`MemoryStore`] is the in-process implementation.

use super::error::QueueError;
use super::types::{ChamberId, QueueSession, QueueToken, SessionId, TokenId, TokenStatus};
use chrono::NaiveDate;
use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::trace;

/// Number of tokens per status in one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCounts {
    /// Tokens waiting to be called.
    pub waiting: u32,
    /// Tokens being served (0 or 1).
    pub current: u32,
    /// Served tokens.
    pub completed: u32,
    /// Withdrawn tokens.
    pub cancelled: u32,
}

impl TokenCounts {
    /// Tokens occupying capacity: everything except cancelled.
    #[must_use]
    #[inline]
    pub fn booked(&self) -> u32 {
        self.waiting + self.current + self.completed
    }

    /// Tokens still in line or being served.
    #[must_use]
    #[inline]
    pub fn active(&self) -> u32 {
        self.waiting + self.current
    }

    fn add(&mut self, status: TokenStatus) {
        match status {
            TokenStatus::Waiting => self.waiting += 1,
            TokenStatus::Current => self.current += 1,
            TokenStatus::Completed => self.completed += 1,
            TokenStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// Closure applied to a session row inside [`QueueStore::update_session`].
pub type SessionUpdate<'a> = &'a mut dyn FnMut(&mut QueueSession) -> Result<(), QueueError>;

/// Closure applied to a token row inside [`QueueStore::update_token`].
pub type TokenUpdate<'a> = &'a mut dyn FnMut(&mut QueueToken) -> Result<(), QueueError>;

/// Row storage for sessions and tokens.
///
/// Updates go through closures so that a read-check-write on one row is
/// atomic with respect to other writers of the same row. If the closure
/// returns an error the row is left untouched.
///
/// # Thread Safety
///
/// Implementations are shared across request handlers and must be
/// `Send + Sync`. Multi-row invariants (capacity, single current token) are
/// the callers' job, serialized through [`SessionLocks`](super::locks::SessionLocks).
pub trait QueueStore: Send + Sync {
    /// Insert a new session row.
    ///
    /// # Errors
    /// [`QueueError::Conflict`] if the id already exists.
    fn insert_session(&self, session: QueueSession) -> Result<(), QueueError>;

    /// Fetch a session row.
    fn session(&self, id: SessionId) -> Result<Option<QueueSession>, QueueError>;

    /// Atomically modify a session row and return the new value.
    ///
    /// # Errors
    /// [`QueueError::SessionNotFound`] if the row is missing, or whatever the
    /// closure returns.
    fn update_session(
        &self,
        id: SessionId,
        update: SessionUpdate<'_>,
    ) -> Result<QueueSession, QueueError>;

    /// Remove a session row together with all of its tokens.
    fn remove_session(&self, id: SessionId) -> Result<Option<QueueSession>, QueueError>;

    /// Sessions of a chamber on a date, ordered by start time.
    fn sessions_on(
        &self,
        chamber_id: ChamberId,
        date: NaiveDate,
    ) -> Result<Vec<QueueSession>, QueueError>;

    /// Every session row, in no particular order.
    fn all_sessions(&self) -> Result<Vec<QueueSession>, QueueError>;

    /// Insert a new token row.
    ///
    /// # Errors
    /// [`QueueError::Conflict`] if `(session_id, token_number)` or the token id
    /// is already taken, [`QueueError::SessionNotFound`] if the session row is
    /// missing.
    fn insert_token(&self, token: QueueToken) -> Result<(), QueueError>;

    /// Fetch a token row.
    fn token(&self, id: TokenId) -> Result<Option<QueueToken>, QueueError>;

    /// Atomically modify a token row and return the new value.
    ///
    /// `id`, `session_id` and `token_number` are immutable; a closure that
    /// changes them is rejected.
    fn update_token(&self, id: TokenId, update: TokenUpdate<'_>)
    -> Result<QueueToken, QueueError>;

    /// Hard-delete a token row. Sibling numbers are left as they are.
    fn remove_token(&self, id: TokenId) -> Result<Option<QueueToken>, QueueError>;

    /// Tokens of a session ordered by token number.
    fn session_tokens(&self, session_id: SessionId) -> Result<Vec<QueueToken>, QueueError>;

    /// The waiting token with the lowest number, if any.
    fn first_waiting(&self, session_id: SessionId) -> Result<Option<QueueToken>, QueueError>;

    /// Status histogram of a session's tokens.
    fn count_tokens(&self, session_id: SessionId) -> Result<TokenCounts, QueueError>;

    /// Tokens booked under a normalised phone number on a date.
    fn tokens_by_phone(&self, phone: &str, date: NaiveDate)
    -> Result<Vec<QueueToken>, QueueError>;

    /// Every token row, in no particular order.
    fn all_tokens(&self) -> Result<Vec<QueueToken>, QueueError>;
}

/// In-memory [`QueueStore`].
///
/// Rows live in [`DashMap`]s. Each session additionally owns two ordered
/// [`SkipMap`] indexes keyed by token number: one over all tokens, which
/// doubles as the `(session_id, token_number)` uniqueness constraint, and one
/// over waiting tokens only, so "next in line" is a front lookup.
#[derive(Default)]
pub struct MemoryStore {
    sessions: DashMap<SessionId, QueueSession>,
    tokens: DashMap<TokenId, QueueToken>,
    numbers: DashMap<SessionId, Arc<SkipMap<u32, TokenId>>>,
    waiting: DashMap<SessionId, Arc<SkipMap<u32, TokenId>>>,
    by_phone: DashMap<(String, NaiveDate), Vec<TokenId>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of session rows.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of token rows.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn index(
        map: &DashMap<SessionId, Arc<SkipMap<u32, TokenId>>>,
        id: SessionId,
    ) -> Option<Arc<SkipMap<u32, TokenId>>> {
        map.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    fn index_or_create(
        map: &DashMap<SessionId, Arc<SkipMap<u32, TokenId>>>,
        id: SessionId,
    ) -> Arc<SkipMap<u32, TokenId>> {
        let entry = map.entry(id).or_insert_with(|| Arc::new(SkipMap::new()));
        Arc::clone(entry.value())
    }

    fn unindex_phone(&self, token: &QueueToken) {
        let key = (token.patient.phone.clone(), token.date);
        let now_empty = match self.by_phone.get_mut(&key) {
            Some(mut ids) => {
                ids.retain(|id| *id != token.id);
                ids.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_phone.remove_if(&key, |_, ids| ids.is_empty());
        }
    }
}

impl QueueStore for MemoryStore {
    fn insert_session(&self, session: QueueSession) -> Result<(), QueueError> {
        match self.sessions.entry(session.id) {
            Entry::Occupied(_) => Err(QueueError::Conflict {
                message: format!("session {} already exists", session.id),
            }),
            Entry::Vacant(slot) => {
                trace!("store: insert session {}", session.id);
                slot.insert(session);
                Ok(())
            }
        }
    }

    fn session(&self, id: SessionId) -> Result<Option<QueueSession>, QueueError> {
        Ok(self.sessions.get(&id).map(|entry| entry.value().clone()))
    }

    fn update_session(
        &self,
        id: SessionId,
        update: SessionUpdate<'_>,
    ) -> Result<QueueSession, QueueError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or(QueueError::SessionNotFound(id))?;
        let mut draft = entry.value().clone();
        update(&mut draft)?;
        if draft.id != id {
            return Err(QueueError::InvalidOperation {
                message: "session id is immutable".to_string(),
            });
        }
        *entry.value_mut() = draft.clone();
        Ok(draft)
    }

    fn remove_session(&self, id: SessionId) -> Result<Option<QueueSession>, QueueError> {
        let removed = self.sessions.remove(&id).map(|(_, session)| session);
        if removed.is_none() {
            return Ok(None);
        }

        self.waiting.remove(&id);
        if let Some((_, numbers)) = self.numbers.remove(&id) {
            for entry in numbers.iter() {
                if let Some((_, token)) = self.tokens.remove(entry.value()) {
                    self.unindex_phone(&token);
                }
            }
        }
        trace!("store: removed session {} and its tokens", id);
        Ok(removed)
    }

    fn sessions_on(
        &self,
        chamber_id: ChamberId,
        date: NaiveDate,
    ) -> Result<Vec<QueueSession>, QueueError> {
        let mut sessions: Vec<QueueSession> = self
            .sessions
            .iter()
            .filter(|entry| entry.chamber_id == chamber_id && entry.date == date)
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by_key(|s| (s.start_time, s.end_time));
        Ok(sessions)
    }

    fn all_sessions(&self) -> Result<Vec<QueueSession>, QueueError> {
        Ok(self.sessions.iter().map(|e| e.value().clone()).collect())
    }

    fn insert_token(&self, token: QueueToken) -> Result<(), QueueError> {
        if !self.sessions.contains_key(&token.session_id) {
            return Err(QueueError::SessionNotFound(token.session_id));
        }
        if self.tokens.contains_key(&token.id) {
            return Err(QueueError::Conflict {
                message: format!("token {} already exists", token.id),
            });
        }

        // Uniqueness backstop: the first writer of a number wins.
        let numbers = Self::index_or_create(&self.numbers, token.session_id);
        let claimed = numbers.get_or_insert(token.token_number, token.id);
        if *claimed.value() != token.id {
            return Err(QueueError::Conflict {
                message: format!(
                    "token number {} already taken in session {}",
                    token.token_number, token.session_id
                ),
            });
        }

        if token.status == TokenStatus::Waiting {
            Self::index_or_create(&self.waiting, token.session_id)
                .insert(token.token_number, token.id);
        }
        self.by_phone
            .entry((token.patient.phone.clone(), token.date))
            .or_default()
            .push(token.id);

        trace!(
            "store: insert token {} #{} in session {}",
            token.id, token.token_number, token.session_id
        );
        self.tokens.insert(token.id, token);
        Ok(())
    }

    fn token(&self, id: TokenId) -> Result<Option<QueueToken>, QueueError> {
        Ok(self.tokens.get(&id).map(|entry| entry.value().clone()))
    }

    fn update_token(
        &self,
        id: TokenId,
        update: TokenUpdate<'_>,
    ) -> Result<QueueToken, QueueError> {
        let (before, after) = {
            let mut entry = self
                .tokens
                .get_mut(&id)
                .ok_or(QueueError::TokenNotFound(id))?;
            let before = entry.value().clone();
            let mut draft = before.clone();
            update(&mut draft)?;
            if draft.id != before.id
                || draft.session_id != before.session_id
                || draft.token_number != before.token_number
            {
                return Err(QueueError::InvalidOperation {
                    message: format!("token {id}: id, session and number are immutable"),
                });
            }
            *entry.value_mut() = draft.clone();
            (before, draft)
        };

        if before.status != after.status {
            if before.status == TokenStatus::Waiting {
                if let Some(waiting) = Self::index(&self.waiting, after.session_id) {
                    waiting.remove(&after.token_number);
                }
            } else if after.status == TokenStatus::Waiting {
                Self::index_or_create(&self.waiting, after.session_id)
                    .insert(after.token_number, after.id);
            }
        }
        if before.patient.phone != after.patient.phone {
            self.unindex_phone(&before);
            self.by_phone
                .entry((after.patient.phone.clone(), after.date))
                .or_default()
                .push(after.id);
        }
        Ok(after)
    }

    fn remove_token(&self, id: TokenId) -> Result<Option<QueueToken>, QueueError> {
        let Some((_, token)) = self.tokens.remove(&id) else {
            return Ok(None);
        };
        if let Some(numbers) = Self::index(&self.numbers, token.session_id) {
            numbers.remove(&token.token_number);
        }
        if let Some(waiting) = Self::index(&self.waiting, token.session_id) {
            waiting.remove(&token.token_number);
        }
        self.unindex_phone(&token);
        trace!("store: removed token {} #{}", token.id, token.token_number);
        Ok(Some(token))
    }

    fn session_tokens(&self, session_id: SessionId) -> Result<Vec<QueueToken>, QueueError> {
        let Some(numbers) = Self::index(&self.numbers, session_id) else {
            return Ok(Vec::new());
        };
        Ok(numbers
            .iter()
            .filter_map(|entry| self.tokens.get(entry.value()).map(|t| t.value().clone()))
            .collect())
    }

    fn first_waiting(&self, session_id: SessionId) -> Result<Option<QueueToken>, QueueError> {
        let Some(waiting) = Self::index(&self.waiting, session_id) else {
            return Ok(None);
        };
        for entry in waiting.iter() {
            let token = self.tokens.get(entry.value()).map(|t| t.value().clone());
            if let Some(token) = token {
                if token.status == TokenStatus::Waiting {
                    return Ok(Some(token));
                }
            }
        }
        Ok(None)
    }

    fn count_tokens(&self, session_id: SessionId) -> Result<TokenCounts, QueueError> {
        let mut counts = TokenCounts::default();
        if let Some(numbers) = Self::index(&self.numbers, session_id) {
            for entry in numbers.iter() {
                if let Some(token) = self.tokens.get(entry.value()) {
                    counts.add(token.status);
                }
            }
        }
        Ok(counts)
    }

    fn tokens_by_phone(
        &self,
        phone: &str,
        date: NaiveDate,
    ) -> Result<Vec<QueueToken>, QueueError> {
        let ids: Vec<TokenId> = self
            .by_phone
            .get(&(phone.to_string(), date))
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.tokens.get(id).map(|t| t.value().clone()))
            .collect())
    }

    fn all_tokens(&self) -> Result<Vec<QueueToken>, QueueError> {
        Ok(self.tokens.iter().map(|e| e.value().clone()).collect())
    }
}
