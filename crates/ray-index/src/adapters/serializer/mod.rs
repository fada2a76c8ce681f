//! Serializer Adapters
//!
//! Implementations of the `NoticeSerializer` trait.

mod bincode;

pub use self::bincode::BincodeNoticeSerializer;
