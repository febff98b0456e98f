//! Domain model: room positions, message servers, protocol records and live
//! broadcast descriptors.

pub mod heartbeat;
pub mod live;
pub mod message;
pub mod room;
pub mod server;

pub use heartbeat::{Heartbeat, HeartbeatErrorCode, HeartbeatStatus};
pub use live::{Community, Live, LiveContext, LiveUser};
pub use message::{ChatMessage, ChatTime, ParsedRecord, PostResult, PostStatus, Rank, ThreadOpened};
pub use room::RoomPosition;
pub use server::{MessageServer, ServerDerivation, ThreadOffsetDerivation};
