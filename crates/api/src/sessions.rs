use chrono::{DateTime, Utc};
use signalboard_core::auth::idle::IdleTimer;
use signalboard_core::auth::{AuthProvider, AuthRejected, Session};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use uuid::Uuid;

struct Entry {
    session: Session,
    timer: IdleTimer,
}

/// Live sessions keyed by an opaque bearer token.
///
/// Each session owns one idle timer; activity re-arms it and expiry removes the
/// session and signs it out upstream.
pub struct SessionRegistry {
    idle_timeout: Duration,
    auth: Option<Arc<dyn AuthProvider>>,
    entries: Mutex<HashMap<String, Entry>>,
    this: Weak<SessionRegistry>,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration, auth: Option<Arc<dyn AuthProvider>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            idle_timeout,
            auth,
            entries: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn arm(&self, token: &str, timer: &IdleTimer) {
        let registry = self.this.clone();
        let token = token.to_string();
        timer.touch(async move {
            if let Some(registry) = registry.upgrade() {
                registry.expire(&token).await;
            }
        });
    }

    pub fn insert(&self, session: Session) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let timer = IdleTimer::new(self.idle_timeout);
        self.arm(&token, &timer);
        self.entries().insert(token.clone(), Entry { session, timer });
        token
    }

    /// Look up a live session and record activity on it.
    ///
    /// An upstream token at or near its expiry is refreshed; the session ends
    /// here only when the refresh is refused or the token has already lapsed
    /// without one.
    pub async fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        let session = {
            let entries = self.entries();
            let entry = entries.get(token)?;
            self.arm(token, &entry.timer);
            entry.session.clone()
        };
        if !session.needs_refresh(now) {
            return Some(session);
        }

        let refreshed = match &self.auth {
            Some(auth) => auth.refresh(&session).await,
            None => Err(anyhow::anyhow!("no auth provider configured")),
        };
        match refreshed {
            Ok(fresh) => {
                let mut entries = self.entries();
                let entry = entries.get_mut(token)?;
                entry.session = fresh.clone();
                Some(fresh)
            }
            Err(err) => {
                let rejected = err.downcast_ref::<AuthRejected>().is_some();
                if rejected || session.is_expired(now) {
                    tracing::info!(user_id = %session.user_id, error = %err, "session ended; refresh failed");
                    self.remove(token);
                    None
                } else {
                    tracing::warn!(user_id = %session.user_id, error = %err, "session refresh failed; retrying on next request");
                    Some(session)
                }
            }
        }
    }

    pub fn remove(&self, token: &str) -> Option<Session> {
        self.entries().remove(token).map(|entry| {
            entry.timer.cancel();
            entry.session
        })
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    async fn expire(&self, token: &str) {
        let Some(entry) = self.entries().remove(token) else {
            return;
        };
        // This runs on the timer's own task.
        entry.timer.detach();
        let session = entry.session;
        tracing::info!(user_id = %session.user_id, "session expired after inactivity");
        if let Some(auth) = &self.auth {
            if let Err(err) = auth.sign_out(&session).await {
                tracing::warn!(user_id = %session.user_id, error = %err, "sign-out after idle expiry failed");
            }
        }
    }
}
