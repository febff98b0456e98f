//! Room socket listener: one persistent connection per comment room.
//!
//! A listener owns the TCP connection to one message server, feeds received
//! bytes to a [`FrameAssembler`], surfaces structured records as events over
//! an mpsc channel, sends the periodic keepalive ping, and supports posting
//! comments on the room's thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::common::time::Clock;
use crate::domain::{
    ChatMessage, Live, LiveUser, MessageServer, ParsedRecord, PostResult, RoomPosition,
    ThreadOpened,
};
use crate::protocol::{FrameAssembler, outbound};

const READ_BUFFER_SIZE: usize = 102_400;
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Events a room listener surfaces to the session orchestrator
#[derive(Debug, Clone)]
pub enum RoomEvent {
    ThreadOpened {
        room: RoomPosition,
        thread: ThreadOpened,
    },
    Chat(ChatMessage),
    PostResult {
        room: RoomPosition,
        result: PostResult,
    },
    Closed {
        room: RoomPosition,
        reason: CloseReason,
    },
}

/// Why a listener stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called
    Requested,
    /// The server closed the stream
    EndOfStream,
    /// Socket read/write failure
    TransportError(String),
}

/// Errors establishing or using a room connection
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[error("socket write failed: {0}")]
    Write(#[from] std::io::Error),

    #[error("listener is closed")]
    Closed,
}

/// Errors posting a comment through a listener
#[derive(Debug, Error)]
pub enum PostError {
    /// The room's thread acknowledgement has not arrived yet
    #[error("no active thread on this room")]
    NoActiveThread,

    #[error("posting token could not be obtained")]
    TokenUnavailable,

    #[error("post send failed: {0}")]
    Transport(#[from] ListenerError),
}

/// Baseline established by the room's thread acknowledgement
#[derive(Debug, Clone)]
struct ThreadBaseline {
    thread: ThreadOpened,
    /// Listener clock time when the acknowledgement arrived
    started_at: i64,
}

/// Gate serializing event emission against close.
///
/// Once `close` wins the gate, no event can be emitted anymore; this is what
/// lets `close()` guarantee silence after it returns even while the read task
/// is still being torn down.
struct EventGate {
    inner: std::sync::Mutex<GateInner>,
}

struct GateInner {
    closed: bool,
    tx: mpsc::UnboundedSender<RoomEvent>,
}

impl EventGate {
    fn new(tx: mpsc::UnboundedSender<RoomEvent>) -> Self {
        Self {
            inner: std::sync::Mutex::new(GateInner { closed: false, tx }),
        }
    }

    /// Emit unless the gate is closed. Returns false once closed.
    fn emit(&self, event: RoomEvent) -> bool {
        let inner = self.inner.lock().expect("event gate poisoned");
        if inner.closed {
            return false;
        }
        let _ = inner.tx.send(event);
        true
    }

    /// Close the gate, emitting the final `Closed` event. Returns false if
    /// the gate was already closed (emission skipped).
    fn close(&self, room: RoomPosition, reason: CloseReason) -> bool {
        let mut inner = self.inner.lock().expect("event gate poisoned");
        if inner.closed {
            return false;
        }
        let _ = inner.tx.send(RoomEvent::Closed { room, reason });
        inner.closed = true;
        true
    }
}

/// State shared between the listener handle and its read task
struct ListenerShared {
    server: MessageServer,
    gate: EventGate,
    writer: Mutex<Option<OwnedWriteHalf>>,
    baseline: std::sync::Mutex<Option<ThreadBaseline>>,
    last_sequence: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl ListenerShared {
    async fn send_raw(&self, message: &str) -> Result<(), ListenerError> {
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(ListenerError::Closed);
        };
        tracing::debug!(room = %self.server.room_position, "sending: {}", message);
        let mut framed = message.as_bytes().to_vec();
        framed.push(0);
        writer.write_all(&framed).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Release the connection and emit `Closed` at most once
    async fn release(&self, reason: CloseReason) -> bool {
        let emitted = self.gate.close(self.server.room_position, reason);
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        emitted
    }
}

/// Handle to one open room connection.
pub struct RoomListener {
    shared: Arc<ListenerShared>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl RoomListener {
    /// Connect to the message server, send the subscription directive and
    /// start the connection run loop.
    ///
    /// `resume_from` requests that many trailing records be replayed before
    /// live streaming starts.
    pub async fn open(
        server: MessageServer,
        resume_from: u32,
        events: mpsc::UnboundedSender<RoomEvent>,
        clock: Arc<dyn Clock>,
    ) -> Result<RoomListener, ListenerError> {
        let stream = TcpStream::connect((server.host.as_str(), server.port))
            .await
            .map_err(|source| ListenerError::Connect {
                host: server.host.clone(),
                port: server.port,
                source,
            })?;
        tracing::info!(room = %server.room_position, "connected to {}:{}", server.host, server.port);

        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(ListenerShared {
            gate: EventGate::new(events),
            writer: Mutex::new(Some(write_half)),
            baseline: std::sync::Mutex::new(None),
            last_sequence: AtomicU64::new(0),
            clock,
            server,
        });

        shared
            .send_raw(&outbound::subscribe(shared.server.thread_id, resume_from))
            .await?;

        let task_shared = Arc::clone(&shared);
        let read_task = tokio::spawn(async move {
            run_loop(task_shared, read_half).await;
        });

        Ok(RoomListener {
            shared,
            read_task: Mutex::new(Some(read_task)),
        })
    }

    pub fn server(&self) -> &MessageServer {
        &self.shared.server
    }

    pub fn room_position(&self) -> RoomPosition {
        self.shared.server.room_position
    }

    /// Highest chat sequence number observed on this room
    pub fn last_sequence(&self) -> u64 {
        self.shared.last_sequence.load(Ordering::SeqCst)
    }

    /// Paging block for the posting-token endpoint. The divisor is a block
    /// size imposed by that endpoint.
    pub fn paging_block(&self) -> u64 {
        (self.last_sequence() + 1) / 100
    }

    /// Post a comment on this room's thread.
    ///
    /// Fails without touching the socket when no thread acknowledgement has
    /// arrived yet.
    pub async fn post(
        &self,
        live: &Live,
        user: &LiveUser,
        post_key: &str,
        body: &str,
        anonymous: bool,
    ) -> Result<(), PostError> {
        let (thread, started_at) = {
            let baseline = self.shared.baseline.lock().expect("baseline poisoned");
            match baseline.as_ref() {
                Some(baseline) => (baseline.thread.clone(), baseline.started_at),
                None => return Err(PostError::NoActiveThread),
            }
        };

        let now = self.shared.clock.now_unix();
        let vpos = compute_vpos(thread.server_time, live.base_time, now, started_at);
        let message = outbound::post_chat(
            thread.thread_id,
            &thread.ticket,
            vpos,
            post_key,
            anonymous,
            &user.user_id,
            user.premium,
            body,
        );

        self.shared.send_raw(&message).await?;
        Ok(())
    }

    /// Close the connection. Idempotent, callable from any context; after it
    /// returns no further events are delivered from this listener.
    pub async fn close(&self) {
        let emitted = self.shared.release(CloseReason::Requested).await;
        if let Some(task) = self.read_task.lock().await.take() {
            task.abort();
        }
        if emitted {
            tracing::info!(room = %self.shared.server.room_position, "listener closed");
        }
    }
}

/// Virtual timeline position of a post, in centiseconds since stream start.
///
/// Composed of the thread epoch relative to the live time base plus the time
/// elapsed on this listener; the composition is a service-contract assumption
/// carried over from observed client behavior.
fn compute_vpos(thread_server_time: i64, live_base_time: i64, now: i64, started_at: i64) -> i64 {
    ((thread_server_time - live_base_time) + (now - started_at)) * 100
}

/// Connection run loop: reads stream bytes and ticks the keepalive.
async fn run_loop(shared: Arc<ListenerShared>, mut read_half: OwnedReadHalf) {
    let room = shared.server.room_position;
    let mut assembler = FrameAssembler::new(room);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut keepalive =
        tokio::time::interval_at(Instant::now() + KEEPALIVE_INTERVAL, KEEPALIVE_INTERVAL);

    loop {
        tokio::select! {
            read = read_half.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::info!(room = %room, "server closed the stream");
                    shared.release(CloseReason::EndOfStream).await;
                    break;
                }
                Ok(n) => {
                    for record in assembler.feed(&buf[..n]) {
                        handle_record(&shared, record);
                    }
                }
                Err(e) => {
                    tracing::warn!(room = %room, "socket read error: {}", e);
                    shared.release(CloseReason::TransportError(e.to_string())).await;
                    break;
                }
            },
            _ = keepalive.tick() => {
                if let Err(e) = shared.send_raw(&outbound::keepalive()).await {
                    tracing::warn!(room = %room, "keepalive send failed: {}", e);
                    shared.release(CloseReason::TransportError(e.to_string())).await;
                    break;
                }
            }
        }
    }
}

fn handle_record(shared: &ListenerShared, record: ParsedRecord) {
    match record {
        ParsedRecord::Thread(thread) => {
            {
                let mut baseline = shared.baseline.lock().expect("baseline poisoned");
                *baseline = Some(ThreadBaseline {
                    thread: thread.clone(),
                    started_at: shared.clock.now_unix(),
                });
            }
            shared
                .last_sequence
                .store(thread.last_sequence, Ordering::SeqCst);
            shared.gate.emit(RoomEvent::ThreadOpened {
                room: shared.server.room_position,
                thread,
            });
        }
        ParsedRecord::Chat(chat) => {
            shared
                .last_sequence
                .fetch_max(chat.sequence, Ordering::SeqCst);
            shared.gate.emit(RoomEvent::Chat(chat));
        }
        ParsedRecord::Post(result) => {
            shared.gate.emit(RoomEvent::PostResult {
                room: shared.server.room_position,
                result,
            });
        }
    }
}
