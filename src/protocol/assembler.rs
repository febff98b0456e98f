//! Incremental parser for the room socket stream.
//!
//! The wire delivers sibling XML elements concatenated without a root, split
//! at arbitrary byte boundaries and padded with NUL bytes. The assembler
//! buffers raw bytes until the buffered text forms a closed run of elements,
//! then wraps it in a synthetic root and extracts structured records.

use std::collections::HashSet;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::domain::{
    ChatMessage, ChatTime, ParsedRecord, PostResult, PostStatus, Rank, RoomPosition, ThreadOpened,
};

pub struct FrameAssembler {
    room: RoomPosition,
    buffer: Vec<u8>,
    arrival_index: u64,
    framing_errors: u64,
}

impl FrameAssembler {
    pub fn new(room: RoomPosition) -> Self {
        Self {
            room,
            buffer: Vec::new(),
            arrival_index: 0,
            framing_errors: 0,
        }
    }

    /// Feed raw bytes from the socket, returning every record completed by
    /// this chunk.
    ///
    /// Transport NUL padding is stripped before interpretation. The buffer is
    /// parsed only once it starts with `<` and ends with `>`; a buffer that
    /// ends mid-element keeps accumulating, and a buffer with leading garbage
    /// is discarded whole so that reading can resynchronize on the next
    /// chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ParsedRecord> {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != 0));

        let Some(&last) = self.buffer.last() else {
            return Vec::new();
        };
        if last != b'>' {
            // mid-element split; keep buffering silently
            return Vec::new();
        }
        if self.buffer.first() != Some(&b'<') {
            tracing::warn!(
                room = %self.room,
                len = self.buffer.len(),
                "unaligned stream buffer, discarding and resynchronizing"
            );
            self.buffer.clear();
            return Vec::new();
        }

        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();

        match self.parse_complete(&text) {
            Some(records) => records,
            None => {
                self.framing_errors += 1;
                tracing::warn!(room = %self.room, "unparsable stream buffer dropped: {}", text);
                Vec::new()
            }
        }
    }

    /// Count of buffers dropped as unparsable since construction
    pub fn framing_errors(&self) -> u64 {
        self.framing_errors
    }

    /// Parse a complete buffered run of sibling elements. Returns `None` on
    /// malformed markup; no records from the run are emitted in that case.
    fn parse_complete(&mut self, text: &str) -> Option<Vec<ParsedRecord>> {
        let wrapped = format!("<stream>{}</stream>", text);
        let mut reader = Reader::from_str(&wrapped);

        let mut records = Vec::new();
        let mut pending_chat: Option<PendingChat> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(element)) => match element.name().as_ref() {
                    b"chat" => pending_chat = Some(PendingChat::from_attributes(&element)?),
                    b"thread" => {
                        if let Some(thread) = parse_thread_element(&element)? {
                            records.push(ParsedRecord::Thread(thread));
                        }
                    }
                    b"chat_result" => {
                        if let Some(result) = parse_chat_result_element(&element)? {
                            records.push(ParsedRecord::Post(result));
                        }
                    }
                    _ => {}
                },
                Ok(Event::Empty(element)) => match element.name().as_ref() {
                    b"thread" => {
                        if let Some(thread) = parse_thread_element(&element)? {
                            records.push(ParsedRecord::Thread(thread));
                        }
                    }
                    b"chat_result" => {
                        if let Some(result) = parse_chat_result_element(&element)? {
                            records.push(ParsedRecord::Post(result));
                        }
                    }
                    // a self-closing chat has no body and can never be valid
                    b"chat" => {
                        tracing::debug!(room = %self.room, "skipped bodyless chat element");
                    }
                    _ => {}
                },
                Ok(Event::Text(text)) => {
                    if let Some(pending) = pending_chat.as_mut() {
                        pending.body.push_str(&text.unescape().ok()?);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(pending) = pending_chat.as_mut() {
                        pending.body.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Ok(Event::End(element)) => {
                    if element.name().as_ref() == b"chat"
                        && let Some(pending) = pending_chat.take()
                    {
                        match pending.finalize(self.room, self.arrival_index) {
                            Some(chat) => {
                                self.arrival_index += 1;
                                records.push(ParsedRecord::Chat(chat));
                            }
                            None => {
                                tracing::warn!(room = %self.room, "skipped invalid chat record");
                            }
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(room = %self.room, "stream parse error: {}", e);
                    return None;
                }
            }
        }

        Some(records)
    }
}

/// Chat element under construction while its text content accumulates
struct PendingChat {
    sequence: Option<u64>,
    user_id: Option<String>,
    posted_at: Option<ChatTime>,
    rank: Rank,
    score: i64,
    mail: HashSet<String>,
    body: String,
}

impl PendingChat {
    /// `None` means the attributes themselves were malformed markup
    fn from_attributes(element: &BytesStart<'_>) -> Option<PendingChat> {
        let rank = match attr_parsed::<i64>(element, "premium")? {
            Some(raw) => Rank::from_raw(raw),
            // assume an absent attribute means an ordinary poster
            None => Rank::Normal,
        };
        let score = attr_parsed::<i64>(element, "score")?.unwrap_or(0);
        let sequence = attr_parsed::<u64>(element, "no")?;
        let user_id = attr_text(element, "user_id")?;
        let posted_at = match attr_parsed::<i64>(element, "date")? {
            Some(seconds) => Some(ChatTime {
                seconds,
                micros: attr_parsed::<u32>(element, "date_usec")?.unwrap_or(0),
            }),
            None => None,
        };
        let mail = attr_text(element, "mail")?
            .map(|flags| flags.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Some(PendingChat {
            sequence,
            user_id,
            posted_at,
            rank,
            score,
            mail,
            body: String::new(),
        })
    }

    /// Reject records missing any mandatory field; the service is known to
    /// emit them occasionally and they are dropped, never delivered.
    fn finalize(self, room: RoomPosition, arrival_index: u64) -> Option<ChatMessage> {
        let sequence = self.sequence?;
        let user_id = self.user_id.filter(|id| !id.is_empty())?;
        if self.body.is_empty() {
            return None;
        }

        Some(ChatMessage {
            sequence,
            user_id,
            posted_at: self.posted_at,
            room,
            rank: self.rank,
            score: self.score,
            mail: self.mail,
            body: self.body,
            arrival_index,
        })
    }
}

/// `None` = malformed markup, `Some(None)` = well-formed but missing a
/// mandatory attribute (the record is dropped, not an error)
fn parse_thread_element(element: &BytesStart<'_>) -> Option<Option<ThreadOpened>> {
    let thread_id = attr_parsed::<u64>(element, "thread")?;
    let ticket = attr_text(element, "ticket")?;
    let server_time = attr_parsed::<i64>(element, "server_time")?;
    let result_code = attr_parsed::<i64>(element, "resultcode")?.unwrap_or(0);
    let last_sequence = attr_parsed::<u64>(element, "last_res")?.unwrap_or(0);

    let (Some(thread_id), Some(ticket), Some(server_time)) = (thread_id, ticket, server_time)
    else {
        tracing::warn!("skipped thread acknowledgement missing mandatory attributes");
        return Some(None);
    };

    Some(Some(ThreadOpened {
        thread_id,
        result_code,
        last_sequence,
        ticket,
        server_time,
    }))
}

fn parse_chat_result_element(element: &BytesStart<'_>) -> Option<Option<PostResult>> {
    match attr_parsed::<i64>(element, "status")? {
        Some(raw) => Some(Some(PostResult {
            status: PostStatus::from_raw(raw),
        })),
        None => {
            tracing::warn!("skipped post result missing status attribute");
            Some(None)
        }
    }
}

/// Attribute as unescaped text. Outer `None` = malformed markup.
fn attr_text(element: &BytesStart<'_>, name: &str) -> Option<Option<String>> {
    match element.try_get_attribute(name) {
        Ok(Some(attribute)) => match attribute.unescape_value() {
            Ok(value) => Some(Some(value.into_owned())),
            Err(_) => None,
        },
        Ok(None) => Some(None),
        Err(_) => None,
    }
}

/// Attribute parsed into a number. An attribute that is present but not a
/// number is treated as absent; the service occasionally emits junk values.
fn attr_parsed<T: std::str::FromStr>(element: &BytesStart<'_>, name: &str) -> Option<Option<T>> {
    Some(attr_text(element, name)?.and_then(|value| value.parse().ok()))
}
