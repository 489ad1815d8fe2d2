//! ASAM MDF 4.10 export and read-back
//!
//! The writer emits a sorted file with one data group per setup. Each group
//! carries the 35 telemetry channels as little-endian `f64` values, with
//! `time` as the master channel. The reader understands exactly that subset
//! of the format and rejects anything else with `Error::Mdf4`.
//!
//! References:
//! - ASAM MDF 4.1.0 (ISO 22901-1 companion), block layout in chapter 5

pub mod blocks;
pub mod reader;
pub mod writer;

pub use reader::{ChannelGroup, ChannelInfo, Mdf4File};
pub use writer::{
    encode_groups, encode_mdf4, write_groups, write_mdf4, ChannelSpec, GroupData, Mdf4Header,
};
