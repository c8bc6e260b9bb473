use crate::error::LubaError;
use crate::message::LubaMessage;

/// Bytes ⇄ [`LubaMessage`] transform.
///
/// Both directions are total over well-formed input; anything else
/// fails with [`LubaError::Decode`] or [`LubaError::Encoding`].
pub trait MessageCodec: Send + Sync {
    fn encode(&self, message: &LubaMessage) -> Result<Vec<u8>, LubaError>;

    fn decode(&self, bytes: &[u8]) -> Result<LubaMessage, LubaError>;
}

/// `serde` + `bincode` implementation of the application schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl MessageCodec for BincodeCodec {
    fn encode(&self, message: &LubaMessage) -> Result<Vec<u8>, LubaError> {
        bincode::serialize(message).map_err(|e| LubaError::Encoding(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<LubaMessage, LubaError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
