use crate::domain::errors::SerializationError;
use crate::domain::notice::Notice;
use crate::ports::outbound::NoticeSerializer;

/// Default notice serializer using bincode.
///
/// Attributes live in a `BTreeMap`, so equal notices always encode to equal
/// bytes and therefore to the same stash key.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeNoticeSerializer;

impl NoticeSerializer for BincodeNoticeSerializer {
    fn serialize(&self, notice: &Notice) -> Result<Vec<u8>, SerializationError> {
        bincode::serialize(notice).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }

    fn deserialize(&self, data: &[u8]) -> Result<Notice, SerializationError> {
        bincode::deserialize(data).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }
}
