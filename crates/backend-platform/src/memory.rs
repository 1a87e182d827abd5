use std::{
    collections::HashMap,
    sync::{
        Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use backend_core::types::Profile;

use crate::api::{AuthApi, AuthSession, PlatformError, StoreApi};
use crate::query::{Filter, Patch, Row, SelectQuery, StoreEvent, Table, compare_values};

const FEED_BUFFER: usize = 64;

#[derive(Debug, Clone)]
struct MemoryAccount {
    email: String,
    password: String,
    user_id: String,
}

#[derive(Default)]
struct MemoryState {
    rows: HashMap<Table, Vec<Row>>,
    accounts: Vec<MemoryAccount>,
    /// access token -> user ID
    sessions: HashMap<String, String>,
    /// recovery token -> account email, insertion order
    reset_tokens: Vec<(String, String)>,
}

struct Feeds {
    profiles: broadcast::Sender<StoreEvent>,
    requests: broadcast::Sender<StoreEvent>,
    offers: broadcast::Sender<StoreEvent>,
    messages: broadcast::Sender<StoreEvent>,
    reviews: broadcast::Sender<StoreEvent>,
    categories: broadcast::Sender<StoreEvent>,
    notifications: broadcast::Sender<StoreEvent>,
}

impl Default for Feeds {
    fn default() -> Self {
        let sender = || broadcast::channel(FEED_BUFFER).0;
        Self {
            profiles: sender(),
            requests: sender(),
            offers: sender(),
            messages: sender(),
            reviews: sender(),
            categories: sender(),
            notifications: sender(),
        }
    }
}

impl Feeds {
    fn for_table(&self, table: Table) -> &broadcast::Sender<StoreEvent> {
        match table {
            Table::Profiles => &self.profiles,
            Table::Requests => &self.requests,
            Table::Offers => &self.offers,
            Table::Messages => &self.messages,
            Table::Reviews => &self.reviews,
            Table::Categories => &self.categories,
            Table::Notifications => &self.notifications,
        }
    }
}

/// Self-contained platform used by tests and the console demo.
///
/// Implements both seam traits over plain in-process state: collections
/// are JSON-filterable row vectors, change feeds are broadcast channels,
/// and the auth side keeps accounts, sessions and recovery tokens.
/// "Reset emails" are recorded tokens readable through
/// [`MemoryPlatform::last_reset_token`].
pub struct MemoryPlatform {
    state: RwLock<MemoryState>,
    feeds: Feeds,
    /// Strictly increasing millisecond clock; ticked per use so two rows
    /// never share a timestamp.
    clock: AtomicU64,
    fail_next: Mutex<Option<PlatformError>>,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        let start_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            state: RwLock::new(MemoryState::default()),
            feeds: Feeds::default(),
            clock: AtomicU64::new(start_ms),
            fail_next: Mutex::new(None),
        }
    }

    /// Register an account together with its profile row.
    pub fn seed_account(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
        profile: Profile,
    ) -> Result<(), PlatformError> {
        let mut state = self.write_state()?;
        state.accounts.push(MemoryAccount {
            email: email.into(),
            password: password.into(),
            user_id: profile.id.clone(),
        });
        state
            .rows
            .entry(Table::Profiles)
            .or_default()
            .push(Row::Profile(profile));
        Ok(())
    }

    /// Store a prebuilt row without emitting a change event.
    pub fn seed_row(&self, row: Row) -> Result<(), PlatformError> {
        let mut state = self.write_state()?;
        state.rows.entry(row.table()).or_default().push(row);
        Ok(())
    }

    /// Latest recovery token recorded for `email`, in place of a real
    /// reset email.
    pub fn last_reset_token(&self, email: &str) -> Result<Option<String>, PlatformError> {
        let state = self.read_state()?;
        Ok(state
            .reset_tokens
            .iter()
            .rev()
            .find(|(_, e)| e.eq_ignore_ascii_case(email))
            .map(|(token, _)| token.clone()))
    }

    /// Make the next store operation fail with `error`, once.
    pub fn fail_next_store_op(&self, error: PlatformError) -> Result<(), PlatformError> {
        let mut fail_next = self
            .fail_next
            .lock()
            .map_err(|_| PlatformError::Backend("poisoned lock".to_owned()))?;
        *fail_next = Some(error);
        Ok(())
    }

    /// Rows currently stored in `table`; handy for asserting that an
    /// operation did or did not write.
    pub fn row_count(&self, table: Table) -> Result<usize, PlatformError> {
        let state = self.read_state()?;
        Ok(state.rows.get(&table).map_or(0, Vec::len))
    }

    fn now_ms(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, MemoryState>, PlatformError> {
        self.state
            .read()
            .map_err(|_| PlatformError::Backend("poisoned lock".to_owned()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, PlatformError> {
        self.state
            .write()
            .map_err(|_| PlatformError::Backend("poisoned lock".to_owned()))
    }

    fn take_injected_failure(&self) -> Result<Option<PlatformError>, PlatformError> {
        let mut fail_next = self
            .fail_next
            .lock()
            .map_err(|_| PlatformError::Backend("poisoned lock".to_owned()))?;
        Ok(fail_next.take())
    }

    /// Fill in blank IDs and zero timestamps the way a real platform
    /// assigns them server-side.
    fn complete_row(&self, row: &mut Row) {
        let fresh_id = || Uuid::new_v4().to_string();
        match row {
            Row::Profile(p) => {
                if p.id.is_empty() {
                    p.id = fresh_id();
                }
                if p.created_at_ms == 0 {
                    p.created_at_ms = self.now_ms();
                }
            }
            Row::Request(r) => {
                if r.id.is_empty() {
                    r.id = fresh_id();
                }
                if r.created_at_ms == 0 {
                    r.created_at_ms = self.now_ms();
                }
            }
            Row::Offer(o) => {
                if o.id.is_empty() {
                    o.id = fresh_id();
                }
                if o.created_at_ms == 0 {
                    o.created_at_ms = self.now_ms();
                }
            }
            Row::Message(m) => {
                if m.id.is_empty() {
                    m.id = fresh_id();
                }
                if m.created_at_ms == 0 {
                    m.created_at_ms = self.now_ms();
                }
            }
            Row::Review(r) => {
                if r.id.is_empty() {
                    r.id = fresh_id();
                }
                if r.created_at_ms == 0 {
                    r.created_at_ms = self.now_ms();
                }
            }
            Row::Category(c) => {
                if c.id.is_empty() {
                    c.id = fresh_id();
                }
            }
            Row::Notification(n) => {
                if n.id.is_empty() {
                    n.id = fresh_id();
                }
                if n.created_at_ms == 0 {
                    n.created_at_ms = self.now_ms();
                }
            }
        }
    }
}

#[async_trait]
impl StoreApi for MemoryPlatform {
    async fn select(&self, query: SelectQuery) -> Result<Vec<Row>, PlatformError> {
        if let Some(err) = self.take_injected_failure()? {
            return Err(err);
        }

        let state = self.read_state()?;
        let mut hits: Vec<(Row, serde_json::Value)> = Vec::new();
        for row in state.rows.get(&query.table).into_iter().flatten() {
            let value = row
                .to_value()
                .map_err(|err| PlatformError::Backend(err.to_string()))?;
            if query.filters.iter().all(|f| f.matches(&value)) {
                hits.push((row.clone(), value));
            }
        }
        drop(state);

        if let Some(order) = &query.order {
            hits.sort_by(|(_, a), (_, b)| {
                let a = a.get(&order.column).unwrap_or(&serde_json::Value::Null);
                let b = b.get(&order.column).unwrap_or(&serde_json::Value::Null);
                let ordering = compare_values(a, b);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }

        Ok(hits.into_iter().map(|(row, _)| row).collect())
    }

    async fn insert(&self, mut row: Row) -> Result<Row, PlatformError> {
        if let Some(err) = self.take_injected_failure()? {
            return Err(err);
        }

        let event = {
            let mut state = self.write_state()?;
            self.complete_row(&mut row);
            let table = row.table();
            let rows = state.rows.entry(table).or_default();
            if rows.iter().any(|r| r.id() == row.id()) {
                return Err(PlatformError::Conflict(format!(
                    "duplicate id '{}' in {table}",
                    row.id()
                )));
            }
            rows.push(row.clone());
            StoreEvent::inserted(row.clone())
        };

        // Delivery is best-effort; tables with no subscribers drop it.
        let _ = self.feeds.for_table(event.table).send(event);
        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        filters: Vec<Filter>,
        patch: Patch,
    ) -> Result<u64, PlatformError> {
        if let Some(err) = self.take_injected_failure()? {
            return Err(err);
        }

        let events = {
            let mut state = self.write_state()?;
            let rows = state.rows.entry(table).or_default();
            let mut events = Vec::new();
            for row in rows.iter_mut() {
                let mut value = row
                    .to_value()
                    .map_err(|err| PlatformError::Backend(err.to_string()))?;
                if !filters.iter().all(|f| f.matches(&value)) {
                    continue;
                }

                patch.apply_to(&mut value);
                let updated = Row::from_value(table, value).map_err(|err| {
                    PlatformError::Backend(format!("patch produced an invalid {table} row: {err}"))
                })?;
                if updated.id() != row.id() {
                    return Err(PlatformError::Backend(
                        "patch must not change a row id".to_owned(),
                    ));
                }

                *row = updated.clone();
                events.push(StoreEvent::updated(updated));
            }
            events
        };

        let count = events.len() as u64;
        for event in events {
            let _ = self.feeds.for_table(table).send(event);
        }
        Ok(count)
    }

    fn subscribe(&self, table: Table) -> broadcast::Receiver<StoreEvent> {
        self.feeds.for_table(table).subscribe()
    }
}

#[async_trait]
impl AuthApi for MemoryPlatform {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, PlatformError> {
        let mut state = self.write_state()?;
        // Same rejection for unknown email and wrong password.
        let account = state
            .accounts
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email) && a.password == password)
            .cloned()
            .ok_or(PlatformError::InvalidCredentials)?;

        let session = AuthSession {
            access_token: Uuid::new_v4().to_string(),
            user_id: account.user_id,
        };
        state
            .sessions
            .insert(session.access_token.clone(), session.user_id.clone());
        Ok(session)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), PlatformError> {
        let mut state = self.write_state()?;
        match state.sessions.remove(access_token) {
            Some(_) => Ok(()),
            None => Err(PlatformError::SessionExpired),
        }
    }

    async fn current_user(&self, access_token: &str) -> Result<Option<String>, PlatformError> {
        let state = self.read_state()?;
        Ok(state.sessions.get(access_token).cloned())
    }

    async fn reset_password(&self, email: &str) -> Result<(), PlatformError> {
        let mut state = self.write_state()?;
        let known = state
            .accounts
            .iter()
            .any(|a| a.email.eq_ignore_ascii_case(email));
        if known {
            let token = Uuid::new_v4().to_string();
            state.reset_tokens.push((token, email.to_lowercase()));
        }
        Ok(())
    }

    async fn recover_session(&self, recovery_token: &str) -> Result<AuthSession, PlatformError> {
        let mut state = self.write_state()?;
        let position = state
            .reset_tokens
            .iter()
            .position(|(token, _)| token == recovery_token)
            .ok_or(PlatformError::InvalidCredentials)?;
        let (_, email) = state.reset_tokens.remove(position);

        let account = state
            .accounts
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(&email))
            .cloned()
            .ok_or(PlatformError::InvalidCredentials)?;

        let session = AuthSession {
            access_token: Uuid::new_v4().to_string(),
            user_id: account.user_id,
        };
        state
            .sessions
            .insert(session.access_token.clone(), session.user_id.clone());
        Ok(session)
    }

    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.write_state()?;
        let user_id = state
            .sessions
            .get(access_token)
            .cloned()
            .ok_or(PlatformError::SessionExpired)?;

        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.user_id == user_id)
            .ok_or_else(|| PlatformError::Backend("session without account".to_owned()))?;
        account.password = new_password.to_owned();
        Ok(())
    }
}
