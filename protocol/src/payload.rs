//! 消息类型与负载定义
//!
//! 每种消息由 [`MessageId`] 标识，负载为下方对应的结构体；
//! 负载为空的消息没有对应结构体。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 客户端 ID（服务端为每个连接分配）
pub type ClientId = u16;

/// 会话 ID
pub type SessionId = u16;

/// 棋钟剩余时间（毫秒）
pub type ClockTime = u32;

macro_rules! message_ids {
    ($($(#[$meta:meta])* $name:ident = $value:literal,)*) => {
        /// 消息 ID
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum MessageId {
            $($(#[$meta])* $name = $value,)*
        }

        impl TryFrom<u16> for MessageId {
            type Error = u16;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$name),)*
                    other => Err(other),
                }
            }
        }
    };
}

message_ids! {
    // === 握手（保留，未使用） ===
    ClientHello = 0,
    ServerHelloAccept = 1,
    ServerHelloReject = 2,

    // === 心跳 ===
    /// 客户端探测服务端是否存活
    ClientPing = 3,
    /// 服务端原样回复时间戳
    ServerPing = 4,

    // === 会话管理 ===
    ClientRequestGameSession = 5,
    ServerAcceptGameSession = 6,
    ServerRejectGameSession = 7,
    ClientRequestJoinGameSession = 8,
    ServerAcceptJoinGameSession = 9,
    ServerRejectJoinGameSession = 10,
    /// 通知已在会话中的一方：对手加入
    ServerRemoteJoinedGameSession = 11,
    ClientLeaveGameSession = 12,
    /// 对手主动离开或断线
    ServerRemoteLeaveGameSession = 13,

    // === 对局 ===
    ClientPlayMove = 14,
    ServerRemotePlayedMove = 15,
    /// 仅更新棋钟，不回复
    ClientUpdateTurnTime = 16,
    ClientTimeout = 17,
    ServerRemoteTimedOut = 18,
    ClientResign = 19,
    ServerRemoteResigned = 20,
    ClientOfferDraw = 21,
    ServerRemoteOfferedDraw = 22,
    ClientAcceptDraw = 23,
    ServerRemoteAcceptedDraw = 24,

    // === 聊天 ===
    ClientSendMessage = 25,
    ServerRemoteSentMessage = 26,

    // === 再来一局 ===
    ClientRematch = 27,
    /// 双方都同意再来一局，发送给双方
    ServerRematch = 28,
    ClientCancelRematch = 29,
    ServerCancelRematch = 30,
}

impl From<MessageId> for u16 {
    fn from(id: MessageId) -> Self {
        id as u16
    }
}

/// 执子方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Player {
    White,
    Black,
}

impl Player {
    /// 对手
    pub fn opponent(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

/// 游戏模式（只有相同模式的客户端才能同局）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    NineMensMorris,
    TwelveMensMorris,
}

/// 拒绝请求时携带的错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// 会话数量已满
    TooManySessions,
    /// 会话不存在
    InvalidSessionId,
    /// 会话双方都已离开
    SessionExpired,
    /// 会话的游戏模式不同
    SessionDifferentGame,
    /// 会话已满
    SessionOccupied,
}

/// 一条聊天记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub name: String,
    pub text: String,
}

/// 只携带会话 ID 的客户端消息
/// (离开、超时、认输、求和、同意和棋、再来一局、取消再来一局)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequestGameSession {
    pub player_name: String,
    /// 对手执哪一方
    pub remote_player: Player,
    pub initial_time: ClockTime,
    pub game_mode: GameMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAcceptGameSession {
    pub session_id: SessionId,
}

/// 创建或加入会话被拒绝
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReject {
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequestJoinGameSession {
    pub session_id: SessionId,
    pub player_name: String,
    pub game_mode: GameMode,
}

/// 加入成功，附带重建对局所需的全部历史
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAcceptJoinGameSession {
    pub session_id: SessionId,
    pub remote_player: Player,
    pub initial_time: ClockTime,
    /// 自己的棋钟
    pub time: ClockTime,
    pub remote_time: ClockTime,
    pub game_over: bool,
    pub moves: Vec<String>,
    pub messages: Vec<ChatMessage>,
    pub remote_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRemoteJoinedGameSession {
    pub remote_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPlayMove {
    pub session_id: SessionId,
    /// 走完这步后自己棋钟上的时间
    pub time: ClockTime,
    pub mv: String,
    pub game_over: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRemotePlayedMove {
    pub time: ClockTime,
    pub mv: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUpdateTurnTime {
    pub session_id: SessionId,
    pub time: ClockTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSendMessage {
    pub session_id: SessionId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRemoteSentMessage {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRematch {
    pub remote_player: Player,
    pub initial_time: ClockTime,
}
