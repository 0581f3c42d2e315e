//! Signed-in identity supplied to the engine.
//!
//! Authentication itself happens elsewhere; this type only carries the
//! current user id and a sign-in epoch. The epoch changes whenever the
//! signed-in user changes, which lets late remote results detect that the
//! session they were issued under is gone.
//!
//! # Invariants
//! - Signing in as the user already signed in changes nothing.
//! - Every identity change is published to `watch()` receivers.

use crate::model::record::UserId;
use log::{debug, info};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Default)]
struct SessionState {
    user_id: Option<UserId>,
    epoch: u64,
}

/// Shared handle to the current identity; clones observe the same session.
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<RwLock<SessionState>>,
    changes: Arc<watch::Sender<Option<UserId>>>,
}

impl Default for Session {
    fn default() -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            changes: Arc::new(changes),
        }
    }
}

impl Session {
    /// Creates a signed-out session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: UserId) -> Self {
        let session = Self::new();
        session.sign_in(user_id);
        session
    }

    pub fn current_user_id(&self) -> Option<UserId> {
        self.state.read().user_id.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.state.read().user_id.is_some()
    }

    pub fn epoch(&self) -> u64 {
        self.state.read().epoch
    }

    /// Current user together with the epoch it was observed in.
    pub fn current(&self) -> Option<(UserId, u64)> {
        let state = self.state.read();
        state
            .user_id
            .clone()
            .map(|user_id| (user_id, state.epoch))
    }

    /// Receiver that is marked changed on every sign-in and sign-out.
    pub fn watch(&self) -> watch::Receiver<Option<UserId>> {
        self.changes.subscribe()
    }

    pub fn sign_in(&self, user_id: UserId) {
        let mut state = self.state.write();
        if state.user_id.as_ref() == Some(&user_id) {
            debug!("event=session_sign_in module=session status=skipped reason=same_user");
            return;
        }
        state.user_id = Some(user_id.clone());
        state.epoch += 1;
        self.changes.send_replace(Some(user_id));
        info!(
            "event=session_sign_in module=session status=ok epoch={}",
            state.epoch
        );
    }

    pub fn sign_out(&self) {
        let mut state = self.state.write();
        if state.user_id.take().is_none() {
            return;
        }
        state.epoch += 1;
        self.changes.send_replace(None);
        info!(
            "event=session_sign_out module=session status=ok epoch={}",
            state.epoch
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_and_out_advance_the_epoch() {
        let session = Session::new();
        assert!(!session.is_signed_in());

        session.sign_in(UserId::new("alice"));
        let signed_in_epoch = session.epoch();
        assert_eq!(session.current_user_id(), Some(UserId::new("alice")));

        session.sign_out();
        assert!(session.current_user_id().is_none());
        assert!(session.epoch() > signed_in_epoch);
    }

    #[test]
    fn signing_out_twice_keeps_the_epoch() {
        let session = Session::signed_in(UserId::new("alice"));
        session.sign_out();
        let epoch = session.epoch();
        session.sign_out();
        assert_eq!(session.epoch(), epoch);
    }

    #[test]
    fn signing_in_as_the_current_user_keeps_the_epoch() {
        let session = Session::signed_in(UserId::new("alice"));
        let mut changes = session.watch();
        let epoch = session.epoch();

        session.sign_in(UserId::new("alice"));

        assert_eq!(session.epoch(), epoch);
        assert!(!changes.has_changed().unwrap());

        session.sign_in(UserId::new("bob"));
        assert!(session.epoch() > epoch);
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), Some(UserId::new("bob")));
    }

    #[test]
    fn clones_share_one_identity() {
        let session = Session::signed_in(UserId::new("alice"));
        let shared = session.clone();
        let mut changes = session.watch();

        shared.sign_out();

        assert!(!session.is_signed_in());
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), None);
    }
}
