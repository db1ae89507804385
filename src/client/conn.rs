//! Live-channel lifecycle as a pure state machine. The socket glue feeds
//! it openings, closures and auth results; it answers with what to do next
//! (reconnect delay, rooms to re-join). Keeping it free of I/O makes every
//! transition testable.

use std::{collections::HashSet, time::Duration};

use crate::rooms::RoomKey;

use super::retry::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("cannot {action} while the channel is {state:?}")]
pub struct InvalidTransition {
    pub state: ChannelState,
    pub action: &'static str,
}

#[derive(Debug)]
pub struct ChannelLifecycle {
    state: ChannelState,
    attempt: u32,
    backoff: Backoff,
    active_rooms: HashSet<RoomKey>,
}

impl ChannelLifecycle {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ChannelState::Disconnected,
            attempt: 0,
            backoff,
            active_rooms: HashSet::new(),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == ChannelState::Authenticated
    }

    pub fn connect(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ChannelState::Disconnected, ChannelState::Connecting, "connect")
    }

    pub fn on_open(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ChannelState::Connecting, ChannelState::Connected, "open")
    }

    pub fn begin_auth(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ChannelState::Connected, ChannelState::Authenticating, "authenticate")
    }

    /// Handshake accepted. Resets the backoff and yields the rooms to
    /// re-join so membership and history resynchronize. Sends that were in
    /// flight before a disconnect are not replayed here; their owner
    /// decides whether to retry them.
    pub fn on_auth_ok(&mut self) -> Result<Vec<RoomKey>, InvalidTransition> {
        self.transition(ChannelState::Authenticating, ChannelState::Authenticated, "finish auth")?;
        self.attempt = 0;
        Ok(self.active_rooms.iter().copied().collect())
    }

    /// Handshake rejected; the socket stays open but unauthenticated.
    pub fn on_auth_failed(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ChannelState::Authenticating, ChannelState::Connected, "fail auth")
    }

    /// Any-state disconnect. Returns how long to wait before redialing.
    pub fn on_close(&mut self) -> Duration {
        self.state = ChannelState::Disconnected;
        let delay = self.backoff.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn track_room(&mut self, key: RoomKey) {
        self.active_rooms.insert(key);
    }

    pub fn forget_room(&mut self, key: &RoomKey) {
        self.active_rooms.remove(key);
    }

    fn transition(
        &mut self,
        expected: ChannelState,
        next: ChannelState,
        action: &'static str,
    ) -> Result<(), InvalidTransition> {
        if self.state != expected {
            return Err(InvalidTransition { state: self.state, action });
        }
        self.state = next;
        Ok(())
    }
}

impl Default for ChannelLifecycle {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticated() -> ChannelLifecycle {
        let mut lifecycle = ChannelLifecycle::default();
        lifecycle.connect().expect("connect");
        lifecycle.on_open().expect("open");
        lifecycle.begin_auth().expect("auth");
        lifecycle.on_auth_ok().expect("auth ok");
        lifecycle
    }

    #[test]
    fn walks_the_happy_path() {
        let lifecycle = authenticated();
        assert_eq!(lifecycle.state(), ChannelState::Authenticated);
        assert!(lifecycle.is_authenticated());
    }

    #[test]
    fn rejects_out_of_order_transitions() {
        let mut lifecycle = ChannelLifecycle::default();
        let err = lifecycle.on_open().expect_err("not connecting yet");
        assert_eq!(err.state, ChannelState::Disconnected);

        lifecycle.connect().expect("connect");
        assert!(lifecycle.begin_auth().is_err());
    }

    #[test]
    fn reconnect_yields_active_rooms_for_rejoin() {
        let mut lifecycle = authenticated();
        lifecycle.track_room(RoomKey::Purchase(501));
        lifecycle.track_room(RoomKey::direct(3, 7));
        lifecycle.forget_room(&RoomKey::direct(3, 7));

        let delay = lifecycle.on_close();
        assert!(delay.as_millis() > 0);
        assert_eq!(lifecycle.state(), ChannelState::Disconnected);

        lifecycle.connect().expect("reconnect");
        lifecycle.on_open().expect("open");
        lifecycle.begin_auth().expect("auth");
        let rejoin = lifecycle.on_auth_ok().expect("auth ok");
        assert_eq!(rejoin, vec![RoomKey::Purchase(501)]);
    }

    #[test]
    fn backoff_resets_after_successful_auth() {
        let mut lifecycle = authenticated();
        let first = lifecycle.on_close();

        // A long outage raises the attempt counter.
        for _ in 0..4 {
            lifecycle.connect().expect("connect");
            lifecycle.on_open().expect("open");
            lifecycle.begin_auth().expect("auth");
            lifecycle.on_auth_failed().expect("rejected");
            lifecycle.on_close();
        }

        lifecycle.connect().expect("connect");
        lifecycle.on_open().expect("open");
        lifecycle.begin_auth().expect("auth");
        lifecycle.on_auth_ok().expect("auth ok");

        let after_reset = lifecycle.on_close();
        // Jitter makes exact equality meaningless; the reset delay must be
        // at the base magnitude again rather than the escalated one.
        assert!(after_reset <= first * 2);
    }
}
