//! Session orchestration over one live broadcast.
//!
//! The orchestrator owns the set of open room listeners, fans their events
//! into a single ordered stream for the consumer, opens overflow rooms as
//! traffic and entitlement allow, and runs the heartbeat loop.

pub mod heartbeat;
pub mod progression;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::{AbuseReport, ApiError, LiveApi};
use crate::common::time::{Clock, SystemClock};
use crate::domain::{
    ChatMessage, Community, Heartbeat, Live, LiveUser, MessageServer, PostResult, RoomPosition,
    ServerDerivation,
};
use crate::listener::{CloseReason, ListenerError, PostError, RoomEvent, RoomListener};

pub use heartbeat::DEFAULT_HEARTBEAT_INTERVAL;

/// Chat body that terminates the session when sent by the broadcaster or the
/// service on the arena room
const DISCONNECT_DIRECTIVE: &str = "/disconnect";

/// Session lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Live,
    Disconnecting,
}

/// Events delivered to the session consumer.
///
/// Within one room, chat events preserve the room's frame order; no ordering
/// is promised across rooms.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Entry metadata resolved; listeners are about to start
    Prepared {
        live: Live,
        user: LiveUser,
        community: Community,
    },
    /// A room's comment thread acknowledged the subscription
    ListeningStarted { room: RoomPosition },
    /// First ordinary chat observed on a room
    FirstChat(ChatMessage),
    Chat(ChatMessage),
    PostResult {
        room: RoomPosition,
        result: PostResult,
    },
    Heartbeat(Heartbeat),
    RoomClosed {
        room: RoomPosition,
        reason: CloseReason,
    },
    /// Session terminated; emitted exactly once per session
    Disconnected,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is already connecting or connected")]
    AlreadyConnected,

    #[error("session is not connected")]
    NotConnected,

    #[error("collaborator request failed: {0}")]
    Api(#[from] ApiError),

    #[error("could not derive the room server list from the assigned server")]
    Derivation,

    #[error("failed to open the arena listener: {0}")]
    ArenaConnect(#[from] ListenerError),
}

struct SessionState {
    phase: SessionPhase,
    live: Option<Live>,
    user: Option<LiveUser>,
    community: Option<Community>,
    /// Room the user was assigned to; posting goes there when it is open
    home_room: Option<RoomPosition>,
    servers: Vec<MessageServer>,
    listeners: HashMap<RoomPosition, Arc<RoomListener>>,
    first_chat: HashSet<RoomPosition>,
    /// Rooms opened so far this session; closed rooms are not reopened
    open_count: usize,
    room_events_tx: Option<mpsc::UnboundedSender<RoomEvent>>,
    fanin_task: Option<JoinHandle<()>>,
    heartbeat_shutdown: Option<watch::Sender<bool>>,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            live: None,
            user: None,
            community: None,
            home_room: None,
            servers: Vec::new(),
            listeners: HashMap::new(),
            first_chat: HashSet::new(),
            open_count: 0,
            room_events_tx: None,
            fanin_task: None,
            heartbeat_shutdown: None,
            heartbeat_task: None,
        }
    }
}

/// Orchestrates the listeners, heartbeat and event fan-in of one session.
pub struct SessionOrchestrator {
    api: Arc<dyn LiveApi>,
    derivation: Arc<dyn ServerDerivation>,
    clock: Arc<dyn Clock>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    state: Arc<Mutex<SessionState>>,
}

impl SessionOrchestrator {
    /// Create an orchestrator and the receiving end of its event stream.
    pub fn new(
        api: Arc<dyn LiveApi>,
        derivation: Arc<dyn ServerDerivation>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        Self::with_clock(api, derivation, Arc::new(SystemClock))
    }

    pub fn with_clock(
        api: Arc<dyn LiveApi>,
        derivation: Arc<dyn ServerDerivation>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            api,
            derivation,
            clock,
            events_tx,
            state: Arc::new(Mutex::new(SessionState::new())),
        };
        (orchestrator, events_rx)
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    /// Connect to a live broadcast: resolve the entry point, open the arena
    /// listener and start the heartbeat loop.
    ///
    /// On failure the session stays disconnected with no partial state.
    pub async fn connect(&self, live_id: &str) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock().await;
            if state.phase != SessionPhase::Disconnected {
                return Err(SessionError::AlreadyConnected);
            }
            state.phase = SessionPhase::Connecting;
        }

        match self.try_connect(live_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut state = self.state.lock().await;
                *state = SessionState::new();
                Err(e)
            }
        }
    }

    async fn try_connect(&self, live_id: &str) -> Result<(), SessionError> {
        let context = self.api.resolve_live(live_id).await?;
        tracing::debug!("resolved live {:?}", context.live);

        let community = match context.live.community_id.as_deref() {
            Some(community_id) => self.api.resolve_community(community_id).await?,
            None => Community {
                community_id: String::new(),
                title: None,
                level: None,
                thumbnail_url: None,
            },
        };
        tracing::debug!("resolved community {:?}", community);

        let servers = self
            .derivation
            .derive_all(&context.assigned_server)
            .ok_or(SessionError::Derivation)?;

        // announced before any room opens so listener events never precede it
        let _ = self.events_tx.send(SessionEvent::Prepared {
            live: context.live.clone(),
            user: context.user.clone(),
            community: community.clone(),
        });

        let (room_tx, room_rx) = mpsc::unbounded_channel();
        let arena = RoomListener::open(
            servers[0].clone(),
            0,
            room_tx.clone(),
            Arc::clone(&self.clock),
        )
        .await?;

        let fanin_task = tokio::spawn(run_fanin(
            Arc::clone(&self.state),
            room_rx,
            self.events_tx.clone(),
            Arc::clone(&self.clock),
        ));
        let (heartbeat_shutdown, heartbeat_rx) = watch::channel(false);
        let heartbeat_task = tokio::spawn(heartbeat::run_heartbeat_loop(
            Arc::clone(&self.api),
            context.live.live_id.clone(),
            self.events_tx.clone(),
            heartbeat_rx,
        ));

        {
            let mut state = self.state.lock().await;
            state.live = Some(context.live.clone());
            state.user = Some(context.user.clone());
            state.community = Some(community.clone());
            state.home_room = Some(context.assigned_server.room_position);
            state.servers = servers;
            state.listeners.insert(RoomPosition::Arena, Arc::new(arena));
            state.open_count = 1;
            state.room_events_tx = Some(room_tx);
            state.fanin_task = Some(fanin_task);
            state.heartbeat_shutdown = Some(heartbeat_shutdown);
            state.heartbeat_task = Some(heartbeat_task);
            state.phase = SessionPhase::Live;
        }

        Ok(())
    }

    /// Close every listener, stop the heartbeat loop and clear all session
    /// state. Safe to call repeatedly and from any context; the termination
    /// event is emitted at most once per session.
    pub async fn disconnect(&self) {
        disconnect_inner(&self.state, &self.events_tx).await;
    }

    /// Post a comment on the session's posting room.
    ///
    /// Obtains a one-time posting token from the collaborator first; the
    /// room's read loop keeps running concurrently.
    pub async fn post_comment(&self, body: &str, anonymous: bool) -> Result<(), PostError> {
        let (live, user, listener) = {
            let state = self.state.lock().await;
            if state.phase != SessionPhase::Live {
                return Err(PostError::NoActiveThread);
            }
            let listener = state
                .home_room
                .and_then(|room| state.listeners.get(&room))
                .or_else(|| state.listeners.get(&RoomPosition::Arena))
                .cloned()
                .ok_or(PostError::NoActiveThread)?;
            let live = state.live.clone().ok_or(PostError::NoActiveThread)?;
            let user = state.user.clone().ok_or(PostError::NoActiveThread)?;
            (live, user, listener)
        };

        let thread_id = listener.server().thread_id;
        let block = listener.paging_block();
        let post_key = self
            .api
            .fetch_post_key(thread_id, block)
            .await
            .map_err(|e| {
                tracing::warn!("could not obtain posting token: {}", e);
                PostError::TokenUnavailable
            })?;

        listener.post(&live, &user, &post_key, body, anonymous).await
    }

    /// Report the sender of a chat as abusive.
    pub async fn report_abuse(&self, chat: &ChatMessage) -> Result<(), SessionError> {
        let (live_id, thread_id) = {
            let state = self.state.lock().await;
            let live = state.live.as_ref().ok_or(SessionError::NotConnected)?;
            let thread_id = state
                .servers
                .get(chat.room.ordinal())
                .map(|server| server.thread_id)
                .ok_or(SessionError::NotConnected)?;
            (live.live_id.clone(), thread_id)
        };

        let report = AbuseReport {
            live_id,
            user_id: chat.user_id.clone(),
            tpos: chat
                .posted_at
                .map(|time| time.tpos())
                .unwrap_or_else(|| "0.0".to_string()),
            comment_no: chat.sequence,
            thread_id,
        };
        self.api.report_abuse(&report).await?;
        Ok(())
    }

    /// Apply refreshed community metadata. The new level is taken into
    /// account at the next first-chat signal.
    pub async fn update_community_level(&self, level: u32) {
        let mut state = self.state.lock().await;
        if let Some(community) = state.community.as_mut() {
            community.level = Some(level);
        }
    }
}

/// Serializes every state mutation triggered by listener events.
async fn run_fanin(
    state: Arc<Mutex<SessionState>>,
    mut room_rx: mpsc::UnboundedReceiver<RoomEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
    clock: Arc<dyn Clock>,
) {
    while let Some(event) = room_rx.recv().await {
        match event {
            RoomEvent::ThreadOpened { room, thread } => {
                tracing::debug!(room = %room, "thread opened: {:?}", thread);
                let _ = events.send(SessionEvent::ListeningStarted { room });
            }
            RoomEvent::Chat(chat) => {
                let terminate = handle_chat(&state, &events, &clock, chat).await;
                if terminate {
                    tracing::info!("received session-terminating directive on the arena");
                    disconnect_inner(&state, &events).await;
                }
            }
            RoomEvent::PostResult { room, result } => {
                let _ = events.send(SessionEvent::PostResult { room, result });
            }
            RoomEvent::Closed { room, reason } => {
                let mut state = state.lock().await;
                state.listeners.remove(&room);
                let _ = events.send(SessionEvent::RoomClosed { room, reason });
            }
        }
    }
}

/// Returns true when the chat is the session-terminating directive.
async fn handle_chat(
    state: &Arc<Mutex<SessionState>>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    clock: &Arc<dyn Clock>,
    chat: ChatMessage,
) -> bool {
    {
        let mut state = state.lock().await;
        if chat.rank.is_ordinary() && !state.first_chat.contains(&chat.room) {
            state.first_chat.insert(chat.room);
            let _ = events.send(SessionEvent::FirstChat(chat.clone()));
            open_next_if_allowed(&mut state, clock).await;
        }
    }

    let terminate = chat.body == DISCONNECT_DIRECTIVE
        && chat.rank.is_operator()
        && chat.room == RoomPosition::Arena;
    let _ = events.send(SessionEvent::Chat(chat));
    terminate
}

/// Re-evaluate the progression predicate and open the next room if allowed.
async fn open_next_if_allowed(state: &mut SessionState, clock: &Arc<dyn Clock>) {
    let level = state
        .community
        .as_ref()
        .and_then(|community| community.level)
        .unwrap_or(0);
    let Some(index) = progression::next_room_to_open(
        &state.servers,
        state.open_count,
        &state.first_chat,
        level,
    ) else {
        return;
    };
    let Some(room_tx) = state.room_events_tx.clone() else {
        return;
    };

    let server = state.servers[index].clone();
    let room = server.room_position;
    match RoomListener::open(server, 0, room_tx, Arc::clone(clock)).await {
        Ok(listener) => {
            state.listeners.insert(room, Arc::new(listener));
            state.open_count += 1;
            tracing::info!(room = %room, "opened overflow room");
        }
        Err(e) => {
            tracing::warn!(room = %room, "failed to open overflow room: {}", e);
        }
    }
}

/// Tear the session down: close listeners, stop the heartbeat, clear state.
/// The phase guard makes the termination event fire at most once.
async fn disconnect_inner(
    state: &Arc<Mutex<SessionState>>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    let (listeners, heartbeat_shutdown, heartbeat_task) = {
        let mut state = state.lock().await;
        match state.phase {
            SessionPhase::Live | SessionPhase::Connecting => {
                state.phase = SessionPhase::Disconnecting;
            }
            SessionPhase::Disconnected | SessionPhase::Disconnecting => return,
        }
        (
            state.listeners.drain().map(|(_, l)| l).collect::<Vec<_>>(),
            state.heartbeat_shutdown.take(),
            state.heartbeat_task.take(),
        )
    };

    for listener in listeners {
        listener.close().await;
    }
    if let Some(shutdown) = heartbeat_shutdown {
        let _ = shutdown.send(true);
    }
    if let Some(task) = heartbeat_task {
        let _ = task.await;
    }

    {
        let mut state = state.lock().await;
        // dropping the room sender lets the fan-in task drain and exit
        state.room_events_tx = None;
        state.fanin_task = None;
        state.servers.clear();
        state.first_chat.clear();
        state.live = None;
        state.user = None;
        state.community = None;
        state.home_room = None;
        state.open_count = 0;
        state.phase = SessionPhase::Disconnected;
    }

    let _ = events.send(SessionEvent::Disconnected);
}
