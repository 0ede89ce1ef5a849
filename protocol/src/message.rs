//! 消息信封
//!
//! 线上格式: 4 字节消息头 `{id: u16 大端, payload_size: u16 大端}`，
//! 后跟 `payload_size` 字节的 bincode 负载。

use serde::{de::DeserializeOwned, Serialize};

use crate::constants::{HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::SerializationError;
use crate::payload::MessageId;

/// 消息头
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub payload_size: u16,
}

impl Header {
    /// 编码为网络字节序
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..2].copy_from_slice(&self.id.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.payload_size.to_be_bytes());
        bytes
    }

    /// 从网络字节序解码
    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Self {
        Self {
            id: u16::from_be_bytes([bytes[0], bytes[1]]),
            payload_size: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }
}

/// 一条完整的消息
///
/// 构造后不可变；克隆会深拷贝负载。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: u16,
    payload: Vec<u8>,
}

impl Message {
    /// 创建不带负载的消息
    pub fn new(id: impl Into<u16>) -> Self {
        Self {
            id: id.into(),
            payload: Vec::new(),
        }
    }

    /// 序列化负载并创建消息
    pub fn with_payload<T: Serialize>(
        id: impl Into<u16>,
        payload: &T,
    ) -> Result<Self, SerializationError> {
        let bytes = bincode::serialize(payload)?;
        Self::from_raw(id.into(), bytes)
    }

    /// 从原始负载字节创建消息
    pub fn from_raw(id: u16, payload: Vec<u8>) -> Result<Self, SerializationError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(SerializationError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self { id, payload })
    }

    /// 消息 ID
    pub fn id(&self) -> u16 {
        self.id
    }

    /// 消息类型（未知 ID 返回 None）
    pub fn kind(&self) -> Option<MessageId> {
        MessageId::try_from(self.id).ok()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn header(&self) -> Header {
        Header {
            id: self.id,
            // from_raw 已保证长度不超过 u16
            payload_size: self.payload.len() as u16,
        }
    }

    /// 帧的总长度（消息头 + 负载）
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// 反序列化负载
    pub fn read<T: DeserializeOwned>(&self) -> Result<T, SerializationError> {
        Ok(bincode::deserialize(&self.payload)?)
    }

    /// 编码为一帧完整的字节
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.size());
        frame.extend_from_slice(&self.header().to_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{ClientPlayMove, MessageId};

    #[test]
    fn test_header_big_endian() {
        let header = Header { id: 0x0102, payload_size: 0x0304 };
        assert_eq!(header.to_bytes(), [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(Header::from_bytes([0x01, 0x02, 0x03, 0x04]), header);
    }

    #[test]
    fn test_payload_limit() {
        assert!(Message::from_raw(1, vec![0; MAX_PAYLOAD_SIZE]).is_ok());

        let result = Message::from_raw(1, vec![0; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(
            result,
            Err(SerializationError::PayloadTooLarge { size: 65536, max: 65535 })
        ));
    }

    #[test]
    fn test_read_payload() {
        let payload = ClientPlayMove {
            session_id: 7,
            time: 590_000,
            mv: "a1a4".to_string(),
            game_over: false,
        };
        let message = Message::with_payload(MessageId::ClientPlayMove, &payload).unwrap();

        assert_eq!(message.kind(), Some(MessageId::ClientPlayMove));
        assert_eq!(message.header().payload_size as usize, message.payload().len());
        assert_eq!(message.read::<ClientPlayMove>().unwrap(), payload);
    }

    #[test]
    fn test_malformed_payload() {
        let message = Message::from_raw(MessageId::ClientPlayMove.into(), vec![1, 2]).unwrap();
        assert!(message.read::<ClientPlayMove>().is_err());
    }

    #[test]
    fn test_clone_is_deep() {
        let message = Message::from_raw(3, vec![1, 2, 3]).unwrap();
        let copy = message.clone();
        drop(message);
        assert_eq!(copy.payload(), &[1, 2, 3]);
    }
}
