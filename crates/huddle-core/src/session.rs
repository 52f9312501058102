//! Per-connection session state machine.
//!
//! ```text
//! Connecting ─▶ Authenticating ─▶ Joining ─▶ Active ─▶ Closing ─▶ Closed
//!                     │              │
//!                     └──────────────┴──────────────────────────▶ Closed
//! ```
//!
//! A session is driven by exactly one task. Inbound events are handled in
//! arrival order; each handler runs to completion before the next event is
//! taken. Events for the session arrive through its [`Outbox`].

use crate::dispatcher::ExcludeRule;
use crate::error::SessionError;
use crate::hub::Hub;
use crate::identity::{Identity, MessageId, RoomId, SessionId};
use crate::message::{Message, NewMessage, Reaction};
use crate::presence::PresenceChange;
use crate::registry::SessionHandle;
use huddle_protocol::{decode, ClientEvent, Encoding, MessageKind, ServerEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Joining,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Joining => "joining",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

/// Receiving end of a session's outbound path, owned by the connection
/// writer.
#[derive(Debug)]
pub struct Outbox {
    events: mpsc::Receiver<Arc<ServerEvent>>,
    kick: Arc<Notify>,
}

impl Outbox {
    /// Next event for the connection. `None` once the session is gone.
    pub async fn recv(&mut self) -> Option<Arc<ServerEvent>> {
        self.events.recv().await
    }

    /// Next queued event, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<ServerEvent>> {
        self.events.try_recv().ok()
    }

    /// Signal fired when the session must be terminated (slow consumer or
    /// failed delivery).
    #[must_use]
    pub fn kick_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.kick)
    }
}

/// One live connection's session.
pub struct Session {
    id: SessionId,
    hub: Arc<Hub>,
    state: SessionState,
    identity: Option<Identity>,
    room: Option<RoomId>,
    outbound: mpsc::Sender<Arc<ServerEvent>>,
    kick: Arc<Notify>,
    /// Registered in the room registry and presence tracker.
    attached: bool,
}

impl Session {
    /// Create a session in `Connecting` together with its outbox.
    #[must_use]
    pub fn new(hub: Arc<Hub>) -> (Self, Outbox) {
        let (outbound, events) = mpsc::channel(hub.config().outbound_queue.max(1));
        let kick = Arc::new(Notify::new());
        let session = Self {
            id: SessionId::next(),
            hub,
            state: SessionState::Connecting,
            identity: None,
            room: None,
            outbound,
            kick: Arc::clone(&kick),
            attached: false,
        };
        (session, Outbox { events, kick })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            session = %self.id,
            from = self.state.as_str(),
            to = next.as_str(),
            "Session state"
        );
        self.state = next;
    }

    fn require(&self, state: SessionState) -> Result<(), SessionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(SessionError::NotActive(self.state))
        }
    }

    /// The transport accepted the connection.
    ///
    /// # Errors
    ///
    /// Fails unless the session is `Connecting`.
    pub fn accept(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Connecting)?;
        self.transition(SessionState::Authenticating);
        Ok(())
    }

    /// Resolve the bearer credential supplied at connect time.
    ///
    /// # Errors
    ///
    /// `Auth` if the credential is missing, malformed or rejected. The
    /// session is `Closed` afterwards.
    pub async fn authenticate(
        &mut self,
        credential: Option<&str>,
    ) -> Result<&Identity, SessionError> {
        self.require(SessionState::Authenticating)?;
        match self.hub.authenticate(credential).await {
            Ok(identity) => {
                debug!(session = %self.id, user = %identity.user_id, "Authenticated");
                self.transition(SessionState::Joining);
                Ok(self.identity.insert(identity))
            }
            Err(err) => {
                warn!(session = %self.id, error = %err, "Authentication failed");
                self.transition(SessionState::Closed);
                Err(err.into())
            }
        }
    }

    /// Bind the session to a room and announce presence.
    ///
    /// # Errors
    ///
    /// `Membership` if the identity is not a member of `room`, `Store` if the
    /// membership authority failed. The session is `Closed` afterwards.
    pub async fn join(&mut self, room: RoomId) -> Result<(), SessionError> {
        self.require(SessionState::Joining)?;
        let Some(identity) = self.identity.clone() else {
            return Err(SessionError::NotActive(self.state));
        };

        match self.hub.membership().check(&identity.user_id, &room).await {
            Ok(Some(_role)) => {}
            Ok(None) => {
                warn!(session = %self.id, user = %identity.user_id, room = %room, "Not a member");
                self.transition(SessionState::Closed);
                return Err(SessionError::Membership(room.to_string()));
            }
            Err(err) => {
                warn!(session = %self.id, room = %room, error = %err, "Membership check failed");
                self.transition(SessionState::Closed);
                return Err(err.into());
            }
        }

        let handle = SessionHandle::new(
            self.id,
            identity.clone(),
            self.outbound.clone(),
            Arc::clone(&self.kick),
        );
        self.hub.registry().attach(room, handle);
        let change = self.hub.presence().connect(identity.user_id, self.id);
        self.attached = true;
        self.room = Some(room);
        self.transition(SessionState::Active);
        info!(session = %self.id, user = %identity.user_id, room = %room, "Session active");

        if change == PresenceChange::CameOnline {
            self.hub.announce_presence(&identity, &room, true).await;
        }
        Ok(())
    }

    /// Decode and handle one inbound frame.
    ///
    /// # Errors
    ///
    /// See [`Session::handle`]. Undecodable frames yield `Protocol`.
    pub async fn handle_raw(&mut self, data: &[u8], encoding: Encoding) -> Result<(), SessionError> {
        self.require(SessionState::Active)?;
        match decode::<ClientEvent>(data, encoding) {
            Ok(event) => self.handle(event).await,
            Err(err) => {
                let err = SessionError::from(err);
                warn!(session = %self.id, error = %err, "Dropping malformed frame");
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Handle one inbound event.
    ///
    /// Non-fatal failures are reported to this session as an `error` event
    /// and returned; the session stays `Active`.
    ///
    /// # Errors
    ///
    /// `NotActive` outside `Active`, otherwise the handler's error.
    pub async fn handle(&mut self, event: ClientEvent) -> Result<(), SessionError> {
        self.require(SessionState::Active)?;
        let kind = event.kind();

        let result = match event {
            ClientEvent::SendMessage {
                message_type,
                content,
                reply_to,
            } => self
                .send_message(message_type, content, reply_to.as_deref())
                .await
                .map(|_| ()),
            ClientEvent::Typing { is_typing } => self.typing(is_typing),
            ClientEvent::Read { message_id } => self.read(&message_id).await,
            ClientEvent::React {
                message_id,
                emoji,
                remove,
            } => self.react(&message_id, &emoji, remove).await,
        };

        if let Err(err) = &result {
            warn!(session = %self.id, action = kind, error = %err, "Event rejected");
            self.report(err);
        }
        result
    }

    fn active(&self) -> Result<(&Identity, RoomId), SessionError> {
        match (&self.identity, self.room) {
            (Some(identity), Some(room)) if self.state == SessionState::Active => {
                Ok((identity, room))
            }
            _ => Err(SessionError::NotActive(self.state)),
        }
    }

    /// Persist a message and broadcast it to the room.
    ///
    /// An unresolvable `reply_to` is dropped and reported, the message is
    /// still sent.
    ///
    /// # Errors
    ///
    /// `Protocol` for oversized content, `Store` if persistence fails. Nothing
    /// is broadcast on error.
    pub async fn send_message(
        &self,
        kind: MessageKind,
        content: String,
        reply_to: Option<&str>,
    ) -> Result<Message, SessionError> {
        let (identity, room) = self.active()?;

        let limit = self.hub.config().max_content_length;
        if content.chars().count() > limit {
            return Err(SessionError::Protocol(format!(
                "content exceeds {limit} characters"
            )));
        }

        let reply_to = match reply_to.filter(|raw| !raw.is_empty()) {
            None => None,
            Some(raw) => match self.find_in_room(raw, &room).await? {
                Some(parent) => Some(parent.id),
                None => {
                    self.report(&SessionError::Reference(format!("reply_to {raw}")));
                    None
                }
            },
        };

        let message = self
            .hub
            .store()
            .create(NewMessage {
                room_id: room,
                sender: identity.clone(),
                kind,
                content,
                reply_to,
            })
            .await?;

        let report = self.hub.dispatcher().publish(
            &room,
            ServerEvent::Message {
                data: message.to_view(),
            },
            ExcludeRule::None,
        );
        if let Err(err) = self.hub.delivery().on_broadcast(&message, &report).await {
            warn!(message = %message.id, error = %err, "Failed to record delivery");
        }
        self.hub.notify_offline_members(&message).await;

        Ok(message)
    }

    /// Relay a typing indicator to everyone but the typist.
    ///
    /// # Errors
    ///
    /// `NotActive` outside `Active`.
    pub fn typing(&self, is_typing: bool) -> Result<(), SessionError> {
        let (identity, room) = self.active()?;
        self.hub.dispatcher().publish(
            &room,
            ServerEvent::Typing {
                user_id: identity.user_id.to_string(),
                username: identity.username.clone(),
                is_typing,
            },
            ExcludeRule::User(identity.user_id),
        );
        Ok(())
    }

    /// Record a read receipt and broadcast it if it is new.
    ///
    /// Reading one's own message is ignored.
    ///
    /// # Errors
    ///
    /// `Reference` if the message is not in this room, `Store` on store
    /// failure.
    pub async fn read(&self, message_id: &str) -> Result<(), SessionError> {
        let (identity, room) = self.active()?;
        let message = self
            .find_in_room(message_id, &room)
            .await?
            .ok_or_else(|| SessionError::Reference(format!("message {message_id}")))?;

        if message.is_from(&identity.user_id) {
            debug!(session = %self.id, message = %message.id, "Ignoring read of own message");
            return Ok(());
        }

        let outcome = self
            .hub
            .delivery()
            .on_read(&message, &identity.user_id)
            .await?;
        if outcome.newly_recorded {
            self.hub.dispatcher().publish(
                &room,
                ServerEvent::Read {
                    message_id: message.id.to_string(),
                    user_id: identity.user_id.to_string(),
                    username: identity.username.clone(),
                },
                ExcludeRule::None,
            );
        }
        Ok(())
    }

    /// Add or remove a reaction and broadcast the change.
    ///
    /// Duplicate additions and removals of absent reactions change nothing
    /// and broadcast nothing.
    ///
    /// # Errors
    ///
    /// `Protocol` for an empty or overlong emoji, `Reference` if the message
    /// is not in this room (or is deleted, when adding), `Store` on store
    /// failure.
    pub async fn react(
        &self,
        message_id: &str,
        emoji: &str,
        remove: bool,
    ) -> Result<(), SessionError> {
        let (identity, room) = self.active()?;

        let emoji = emoji.trim();
        let length = emoji.chars().count();
        let max = self.hub.config().max_emoji_length;
        if length == 0 || length > max {
            return Err(SessionError::Protocol(format!(
                "emoji must be 1 to {max} characters"
            )));
        }

        let message = self
            .find_in_room(message_id, &room)
            .await?
            .ok_or_else(|| SessionError::Reference(format!("message {message_id}")))?;

        let changed = if remove {
            self.hub
                .store()
                .remove_reaction(&message.id, &identity.user_id, emoji)
                .await?
        } else {
            if message.is_deleted {
                return Err(SessionError::Reference(format!(
                    "message {message_id} is deleted"
                )));
            }
            self.hub
                .store()
                .add_reaction(Reaction::new(message.id, identity.clone(), emoji))
                .await?
        };

        if changed {
            self.hub.dispatcher().publish(
                &room,
                ServerEvent::Reaction {
                    message_id: message.id.to_string(),
                    user_id: identity.user_id.to_string(),
                    username: identity.username.clone(),
                    emoji: emoji.to_string(),
                    removed: remove,
                },
                ExcludeRule::None,
            );
        }
        Ok(())
    }

    /// Look up a message by its wire id, only if it belongs to `room`.
    async fn find_in_room(&self, raw: &str, room: &RoomId) -> Result<Option<Message>, SessionError> {
        let Ok(id) = raw.parse::<MessageId>() else {
            return Ok(None);
        };
        let message = self.hub.store().get(&id).await?;
        Ok(message.filter(|m| m.room_id == *room))
    }

    /// Queue an error event for this session only.
    fn report(&self, err: &SessionError) {
        if let Some(event) = err.to_event() {
            self.push(event);
        }
    }

    fn push(&self, event: ServerEvent) {
        if self.outbound.try_send(Arc::new(event)).is_err() {
            warn!(session = %self.id, "Outbound queue unavailable, kicking session");
            self.kick.notify_one();
        }
    }

    /// Leave the registry and presence tracker. Returns the identity and room
    /// if this session was the user's last one.
    fn release(&mut self) -> Option<(Identity, RoomId)> {
        if !self.attached {
            return None;
        }
        self.attached = false;

        let (identity, room) = (self.identity.clone()?, self.room?);
        self.hub.registry().detach(&room, self.id);
        match self.hub.presence().disconnect(&identity.user_id, self.id) {
            PresenceChange::WentOffline => Some((identity, room)),
            _ => None,
        }
    }

    /// Shut the session down. Safe to call more than once.
    pub async fn close(&mut self) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }
        self.transition(SessionState::Closing);

        if let Some((identity, room)) = self.release() {
            self.hub.announce_presence(&identity, &room, false).await;
        }

        self.transition(SessionState::Closed);
        info!(session = %self.id, "Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Cancelled before close(). Outside a runtime only the current room
        // can be told.
        if let Some((identity, room)) = self.release() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let hub = Arc::clone(&self.hub);
                    runtime.spawn(async move {
                        hub.announce_presence(&identity, &room, false).await;
                    });
                }
                Err(_) => {
                    if !self.hub.presence().is_online(&identity.user_id) {
                        self.hub.publish_status(&identity, &room, false);
                    }
                }
            }
            debug!(session = %self.id, "Session released on drop");
        }
    }
}
