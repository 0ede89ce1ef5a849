//! 传输层
//!
//! TCP 建连与帧编解码。一帧 = 4 字节消息头 + 负载，负载为空时不读第二次。

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use crate::constants::{CONNECT_TIMEOUT, HEADER_SIZE};
use crate::error::ConnectionError;
use crate::message::{Header, Message};

/// 解析地址并建立 TCP 连接（依次尝试每个解析结果）
pub async fn connect(host: &str, port: u16) -> Result<TcpStream, ConnectionError> {
    let addrs: Vec<_> = lookup_host((host, port)).await?.collect();
    if addrs.is_empty() {
        return Err(ConnectionError::Resolve {
            addr: format!("{host}:{port}"),
        });
    }

    let mut last_error = None;
    for addr in addrs {
        match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => last_error = Some(ConnectionError::Io(e)),
            Err(_) => last_error = Some(ConnectionError::ConnectionTimeout),
        }
    }

    Err(last_error.unwrap_or(ConnectionError::ConnectionClosed))
}

fn map_read_error(e: std::io::Error) -> ConnectionError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ConnectionError::ConnectionClosed
    } else {
        ConnectionError::Io(e)
    }
}

/// 帧读取器
pub struct FrameReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    /// 创建新的帧读取器
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// 读取一帧消息
    pub async fn read_message(&mut self) -> Result<Message, ConnectionError> {
        // 读取消息头
        let mut header = [0u8; HEADER_SIZE];
        self.reader
            .read_exact(&mut header)
            .await
            .map_err(map_read_error)?;
        let header = Header::from_bytes(header);

        // 读取负载
        let mut payload = vec![0u8; header.payload_size as usize];
        if !payload.is_empty() {
            self.reader
                .read_exact(&mut payload)
                .await
                .map_err(map_read_error)?;
        }

        // 长度来自 u16 字段，不会超限
        Message::from_raw(header.id, payload).map_err(|_| ConnectionError::ConnectionClosed)
    }
}

/// 帧写入器
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    /// 创建新的帧写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 写入一帧消息（消息头与负载一次写出）
    pub async fn write_message(&mut self, message: &Message) -> Result<(), ConnectionError> {
        self.writer.write_all(&message.to_frame()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// 关闭写端
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_PAYLOAD_SIZE;
    use crate::payload::{ClientRequestGameSession, GameMode, MessageId, Player};

    async fn round_trip(message: &Message) -> Message {
        let mut buffer = Vec::new();
        FrameWriter::new(&mut buffer).write_message(message).await.unwrap();
        assert_eq!(buffer.len(), message.size());

        FrameReader::new(buffer.as_slice()).read_message().await.unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_payload() {
        let payload = ClientRequestGameSession {
            player_name: "Alice".to_string(),
            remote_player: Player::Black,
            initial_time: 600_000,
            game_mode: GameMode::NineMensMorris,
        };
        let message = Message::with_payload(MessageId::ClientRequestGameSession, &payload).unwrap();

        let decoded = round_trip(&message).await;
        assert_eq!(decoded, message);
        assert_eq!(decoded.read::<ClientRequestGameSession>().unwrap(), payload);
    }

    #[tokio::test]
    async fn test_round_trip_sizes() {
        for size in [0, 1, 255, 256, MAX_PAYLOAD_SIZE] {
            let bytes: Vec<u8> = (0..size).map(|i| i as u8).collect();
            let message = Message::from_raw(9, bytes).unwrap();
            assert_eq!(round_trip(&message).await, message);
        }
    }

    #[tokio::test]
    async fn test_empty_payload_single_header() {
        let message = Message::new(MessageId::ServerRemoteResigned);

        let mut buffer = Vec::new();
        FrameWriter::new(&mut buffer).write_message(&message).await.unwrap();
        assert_eq!(buffer, vec![0, 20, 0, 0]);
    }

    #[tokio::test]
    async fn test_consecutive_frames() {
        let first = Message::from_raw(1, vec![1, 2, 3]).unwrap();
        let second = Message::new(2u16);

        let mut buffer = Vec::new();
        let mut writer = FrameWriter::new(&mut buffer);
        writer.write_message(&first).await.unwrap();
        writer.write_message(&second).await.unwrap();

        let mut reader = FrameReader::new(buffer.as_slice());
        assert_eq!(reader.read_message().await.unwrap(), first);
        assert_eq!(reader.read_message().await.unwrap(), second);
        assert!(matches!(
            reader.read_message().await,
            Err(ConnectionError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_truncated_payload() {
        // 声明 10 字节负载，只给 2 字节
        let buffer = vec![0, 1, 0, 10, 0xAA, 0xBB];
        let result = FrameReader::new(buffer.as_slice()).read_message().await;
        assert!(matches!(result, Err(ConnectionError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_tcp_connect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, _write_half) = stream.into_split();
            FrameReader::new(read_half).read_message().await.unwrap()
        });

        let stream = connect("127.0.0.1", port).await.unwrap();
        let (_read_half, write_half) = stream.into_split();
        let message = Message::from_raw(3, b"ping".to_vec()).unwrap();
        FrameWriter::new(write_half).write_message(&message).await.unwrap();

        assert_eq!(server.await.unwrap(), message);
    }
}
