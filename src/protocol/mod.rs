//! Room socket wire protocol: incremental frame assembly for the inbound
//! stream and builders for the outbound directives.

pub mod assembler;
pub mod outbound;

pub use assembler::FrameAssembler;
