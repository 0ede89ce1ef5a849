//! 会话路由
//!
//! 应用线程上的服务端主逻辑：每帧接管新连接、分发收到的消息、
//! 执行周期任务，最后处理断开的连接。服务端不校验走法，只负责转发。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use protocol::payload::{
    ChatMessage, ClientPlayMove, ClientRequestGameSession, ClientRequestJoinGameSession,
    ClientSendMessage, ClientUpdateTurnTime, Ping, ServerAcceptGameSession,
    ServerAcceptJoinGameSession, ServerReject, ServerRematch, ServerRemoteJoinedGameSession,
    ServerRemotePlayedMove, ServerRemoteSentMessage, SessionPayload,
};
use protocol::{
    ClientId, ErrorCode, Message, MessageId, SerializationError, SessionId, MAX_CHAT_MESSAGE_SIZE,
};

use crate::config::Configuration;
use crate::error::ServerError;
use crate::network::{ClientConnection, Server};
use crate::session::{GameSession, Slot};
use crate::session_pool::SessionPool;
use crate::task::{TaskManager, TaskResult};

type HandlerResult = Result<(), SerializationError>;

/// 路由状态（周期任务也在其上运行）
pub struct RelayState {
    pub server: Server,
    sessions: HashMap<SessionId, GameSession>,
    /// 客户端 ID -> 所在会话
    clients_sessions: HashMap<ClientId, SessionId>,
    session_pool: SessionPool,
}

impl RelayState {
    pub fn new() -> Self {
        Self::with_session_pool(SessionPool::new())
    }

    pub fn with_session_pool(session_pool: SessionPool) -> Self {
        Self {
            server: Server::new(),
            sessions: HashMap::new(),
            clients_sessions: HashMap::new(),
            session_pool,
        }
    }

    pub fn session(&self, session_id: SessionId) -> Option<&GameSession> {
        self.sessions.get(&session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// 客户端当前所在的会话
    pub fn client_session(&self, client_id: ClientId) -> Option<SessionId> {
        self.clients_sessions.get(&client_id).copied()
    }

    /// 分发一条消息；负载无法解析时关闭连接
    ///
    /// 已关闭连接的消息直接丢弃：它可能已经作为断开处理过，ID 也可能已被复用。
    pub fn handle_message(&mut self, connection: &Arc<ClientConnection>, message: &Message) {
        if !connection.is_open() {
            debug!("[{}] 丢弃已关闭连接的消息 {}", connection.id(), message.id());
            return;
        }

        let result = match message.kind() {
            Some(MessageId::ClientHello) => {
                debug!("[{}] 忽略 Hello", connection.id());
                Ok(())
            }
            Some(MessageId::ClientPing) => self.client_ping(connection, message),
            Some(MessageId::ClientRequestGameSession) => self.client_request_game_session(connection, message),
            Some(MessageId::ClientRequestJoinGameSession) => {
                self.client_request_join_game_session(connection, message)
            }
            Some(MessageId::ClientLeaveGameSession) => self.client_leave_game_session(connection, message),
            Some(MessageId::ClientPlayMove) => self.client_play_move(connection, message),
            Some(MessageId::ClientUpdateTurnTime) => self.client_update_turn_time(connection, message),
            Some(MessageId::ClientTimeout) => self.client_timeout(connection, message),
            Some(MessageId::ClientResign) => self.client_resign(connection, message),
            Some(MessageId::ClientOfferDraw) => self.client_offer_draw(connection, message),
            Some(MessageId::ClientAcceptDraw) => self.client_accept_draw(connection, message),
            Some(MessageId::ClientSendMessage) => self.client_send_message(connection, message),
            Some(MessageId::ClientRematch) => self.client_rematch(connection, message),
            Some(MessageId::ClientCancelRematch) => self.client_cancel_rematch(connection, message),
            Some(kind) => {
                warn!("[{}] 意外的消息 {kind:?}", connection.id());
                Ok(())
            }
            None => {
                warn!("[{}] 未知的消息 ID {}", connection.id(), message.id());
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("[{}] 序列化错误: {e}", connection.id());
            connection.close();
        }
    }

    /// 回收双方都已离开的会话
    pub fn collect_sessions(&mut self) {
        debug!("回收会话...");

        let session_pool = &mut self.session_pool;
        self.sessions.retain(|&session_id, session| {
            if session.is_abandoned() {
                session_pool.free(session_id);
                debug!("已回收会话 {session_id}");
                false
            } else {
                true
            }
        });
    }

    /// 从会话中移除断开的客户端，返回需要通知的对手
    fn client_disconnected(&mut self, connection: &Arc<ClientConnection>) -> Option<Arc<ClientConnection>> {
        let session_id = self.clients_sessions.remove(&connection.id())?;

        let Some(session) = self.sessions.get_mut(&session_id) else {
            warn!("客户端 {} 报告的会话 {session_id} 不存在", connection.id());
            return None;
        };

        let Some(slot) = session.slot_of(connection) else {
            warn!("客户端 {} 不在会话 {session_id} 中", connection.id());
            return None;
        };

        session.vacate(slot);
        session.remote(slot)
    }

    fn client_ping(&mut self, connection: &Arc<ClientConnection>, message: &Message) -> HandlerResult {
        let payload: Ping = message.read()?;

        self.send(connection, MessageId::ServerPing, &payload)
    }

    fn client_request_game_session(
        &mut self,
        connection: &Arc<ClientConnection>,
        message: &Message,
    ) -> HandlerResult {
        debug!("客户端 {} 请求新会话", connection.id());

        let payload: ClientRequestGameSession = message.read()?;

        let Some(session_id) = self.session_pool.alloc() else {
            debug!("拒绝客户端 {} 的新会话请求", connection.id());
            return self.send(
                connection,
                MessageId::ServerRejectGameSession,
                &ServerReject {
                    error_code: ErrorCode::TooManySessions,
                },
            );
        };

        let session = GameSession::new(
            session_id,
            payload.game_mode,
            payload.initial_time,
            payload.remote_player.opponent(),
            connection,
            payload.player_name,
        );
        self.sessions.insert(session_id, session);
        self.clients_sessions.insert(connection.id(), session_id);

        debug!("为客户端 {} 创建新会话 {session_id}", connection.id());

        self.send(
            connection,
            MessageId::ServerAcceptGameSession,
            &ServerAcceptGameSession { session_id },
        )
    }

    fn client_request_join_game_session(
        &mut self,
        connection: &Arc<ClientConnection>,
        message: &Message,
    ) -> HandlerResult {
        let payload: ClientRequestJoinGameSession = message.read()?;
        let session_id = payload.session_id;

        let rejection = match self.sessions.get(&session_id) {
            None => {
                debug!("客户端 {} 请求加入不存在的会话", connection.id());
                Some(ErrorCode::InvalidSessionId)
            }
            Some(session) if session.is_abandoned() => {
                warn!("客户端 {} 请求加入已无人的会话 {session_id}", connection.id());
                Some(ErrorCode::SessionExpired)
            }
            Some(session) if session.game_mode != payload.game_mode => {
                debug!(
                    "客户端 {} 请求加入游戏模式不同的会话 {session_id}",
                    connection.id()
                );
                Some(ErrorCode::SessionDifferentGame)
            }
            Some(session) if session.vacant_slot().is_none() => {
                warn!("客户端 {} 请求加入已满的会话 {session_id}", connection.id());
                Some(ErrorCode::SessionOccupied)
            }
            Some(_) => None,
        };

        if let Some(error_code) = rejection {
            return self.send(
                connection,
                MessageId::ServerRejectJoinGameSession,
                &ServerReject { error_code },
            );
        }

        let Some(session) = self.sessions.get_mut(&session_id) else {
            return Ok(());
        };
        let Some(slot) = session.vacant_slot() else {
            return Ok(());
        };

        session.occupy(slot, connection, payload.player_name.clone());

        let accept = ServerAcceptJoinGameSession {
            session_id,
            remote_player: session.player(slot.other()),
            initial_time: session.initial_time,
            time: session.time(slot),
            remote_time: session.time(slot.other()),
            game_over: session.game_over,
            moves: session.moves.clone(),
            messages: session.messages.clone(),
            remote_name: session.name(slot.other()).to_string(),
        };
        let remote = session.remote(slot);

        self.clients_sessions.insert(connection.id(), session_id);

        debug!("客户端 {} 加入会话 {session_id}", connection.id());

        self.send(connection, MessageId::ServerAcceptJoinGameSession, &accept)?;

        if let Some(remote) = remote {
            self.send(
                &remote,
                MessageId::ServerRemoteJoinedGameSession,
                &ServerRemoteJoinedGameSession {
                    remote_name: payload.player_name,
                },
            )?;
        }

        Ok(())
    }

    fn client_leave_game_session(
        &mut self,
        connection: &Arc<ClientConnection>,
        message: &Message,
    ) -> HandlerResult {
        let payload: SessionPayload = message.read()?;

        let Some((session, slot)) = find_session(&mut self.sessions, connection, payload.session_id, "离开")
        else {
            return Ok(());
        };

        session.vacate(slot);
        let remote = session.remote(slot);
        self.clients_sessions.remove(&connection.id());

        debug!("客户端 {} 离开会话 {}", connection.id(), payload.session_id);

        self.notify(remote, Message::new(MessageId::ServerRemoteLeaveGameSession));

        Ok(())
    }

    fn client_play_move(&mut self, connection: &Arc<ClientConnection>, message: &Message) -> HandlerResult {
        let payload: ClientPlayMove = message.read()?;

        let Some((session, slot)) = find_session(&mut self.sessions, connection, payload.session_id, "走棋")
        else {
            return Ok(());
        };

        session.moves.push(payload.mv.clone());
        session.game_over = payload.game_over;
        session.set_time(slot, payload.time);
        let remote = session.remote(slot);

        if let Some(remote) = remote {
            self.send(
                &remote,
                MessageId::ServerRemotePlayedMove,
                &ServerRemotePlayedMove {
                    time: payload.time,
                    mv: payload.mv,
                },
            )?;
        }

        Ok(())
    }

    fn client_update_turn_time(
        &mut self,
        connection: &Arc<ClientConnection>,
        message: &Message,
    ) -> HandlerResult {
        let payload: ClientUpdateTurnTime = message.read()?;

        if let Some((session, slot)) =
            find_session(&mut self.sessions, connection, payload.session_id, "更新计时")
        {
            session.set_time(slot, payload.time);
        }

        Ok(())
    }

    fn client_timeout(&mut self, connection: &Arc<ClientConnection>, message: &Message) -> HandlerResult {
        let payload: SessionPayload = message.read()?;

        let Some((session, slot)) = find_session(&mut self.sessions, connection, payload.session_id, "超时")
        else {
            return Ok(());
        };

        session.game_over = true;
        let remote = session.remote(slot);

        self.notify(remote, Message::new(MessageId::ServerRemoteTimedOut));

        Ok(())
    }

    fn client_resign(&mut self, connection: &Arc<ClientConnection>, message: &Message) -> HandlerResult {
        let payload: SessionPayload = message.read()?;

        let Some((session, slot)) = find_session(&mut self.sessions, connection, payload.session_id, "认输")
        else {
            return Ok(());
        };

        session.game_over = true;
        let remote = session.remote(slot);

        self.notify(remote, Message::new(MessageId::ServerRemoteResigned));

        Ok(())
    }

    fn client_offer_draw(&mut self, connection: &Arc<ClientConnection>, message: &Message) -> HandlerResult {
        let payload: SessionPayload = message.read()?;

        let Some((session, slot)) = find_session(&mut self.sessions, connection, payload.session_id, "求和")
        else {
            return Ok(());
        };

        let remote = session.remote(slot);

        self.notify(remote, Message::new(MessageId::ServerRemoteOfferedDraw));

        Ok(())
    }

    fn client_accept_draw(&mut self, connection: &Arc<ClientConnection>, message: &Message) -> HandlerResult {
        let payload: SessionPayload = message.read()?;

        let Some((session, slot)) = find_session(&mut self.sessions, connection, payload.session_id, "同意和棋")
        else {
            return Ok(());
        };

        session.game_over = true;
        let remote = session.remote(slot);

        self.notify(remote, Message::new(MessageId::ServerRemoteAcceptedDraw));

        Ok(())
    }

    fn client_send_message(&mut self, connection: &Arc<ClientConnection>, message: &Message) -> HandlerResult {
        let mut payload: ClientSendMessage = message.read()?;

        let Some((session, slot)) = find_session(&mut self.sessions, connection, payload.session_id, "发送聊天")
        else {
            return Ok(());
        };

        truncate_chat(&mut payload.message);

        let name = session.name(slot).to_string();
        session.messages.push(ChatMessage {
            name,
            text: payload.message.clone(),
        });
        let remote = session.remote(slot);

        debug!("[{}] 会话 {} 聊天: {}", connection.id(), payload.session_id, payload.message);

        if let Some(remote) = remote {
            self.send(
                &remote,
                MessageId::ServerRemoteSentMessage,
                &ServerRemoteSentMessage {
                    message: payload.message,
                },
            )?;
        }

        Ok(())
    }

    fn client_rematch(&mut self, connection: &Arc<ClientConnection>, message: &Message) -> HandlerResult {
        let payload: SessionPayload = message.read()?;

        let Some((session, slot)) =
            find_session(&mut self.sessions, connection, payload.session_id, "请求再来一局")
        else {
            return Ok(());
        };

        if !session.request_rematch(slot) {
            return Ok(());
        }

        session.restart();

        debug!("会话 {} 再来一局", payload.session_id);

        // 各自收到对手的棋色
        let rematches: Vec<_> = [Slot::First, Slot::Second]
            .into_iter()
            .filter_map(|slot| {
                session.connection(slot).map(|connection| {
                    (
                        connection,
                        ServerRematch {
                            remote_player: session.player(slot.other()),
                            initial_time: session.initial_time,
                        },
                    )
                })
            })
            .collect();

        for (connection, rematch) in rematches {
            self.send(&connection, MessageId::ServerRematch, &rematch)?;
        }

        Ok(())
    }

    fn client_cancel_rematch(
        &mut self,
        connection: &Arc<ClientConnection>,
        message: &Message,
    ) -> HandlerResult {
        let payload: SessionPayload = message.read()?;

        let Some((session, slot)) =
            find_session(&mut self.sessions, connection, payload.session_id, "取消再来一局")
        else {
            return Ok(());
        };

        // 双方都已同意，取消无效
        if session.rematch_agreed() {
            return Ok(());
        }

        session.cancel_rematch(slot);

        self.server
            .send_message(connection, Message::new(MessageId::ServerCancelRematch));

        Ok(())
    }

    fn send<T: Serialize>(
        &mut self,
        connection: &Arc<ClientConnection>,
        id: MessageId,
        payload: &T,
    ) -> HandlerResult {
        let message = Message::with_payload(id, payload)?;
        self.server.send_message(connection, message);

        Ok(())
    }

    /// 发送给对手（已断开则忽略）
    fn notify(&mut self, remote: Option<Arc<ClientConnection>>, message: Message) {
        if let Some(remote) = remote {
            self.server.send_message(&remote, message);
        }
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

/// 查找会话以及发送者所在的位置，找不到时记录警告
fn find_session<'a>(
    sessions: &'a mut HashMap<SessionId, GameSession>,
    connection: &Arc<ClientConnection>,
    session_id: SessionId,
    action: &str,
) -> Option<(&'a mut GameSession, Slot)> {
    let Some(session) = sessions.get_mut(&session_id) else {
        warn!("客户端 {} 报告的会话 {session_id} 不存在", connection.id());
        return None;
    };

    let Some(slot) = session.slot_of(connection) else {
        warn!(
            "客户端 {} 不在会话 {session_id} 中却{action}",
            connection.id()
        );
        return None;
    };

    Some((session, slot))
}

/// 截断过长的聊天内容（保持字符边界）
fn truncate_chat(text: &mut String) {
    if text.len() <= MAX_CHAT_MESSAGE_SIZE {
        return;
    }

    let mut end = MAX_CHAT_MESSAGE_SIZE;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

/// 中继服务
pub struct Relay {
    tasks: TaskManager<RelayState>,
    state: RelayState,
}

impl Relay {
    pub fn new() -> Self {
        Self::with_state(RelayState::new())
    }

    pub fn with_state(state: RelayState) -> Self {
        Self {
            tasks: TaskManager::new(),
            state,
        }
    }

    /// 启动网络服务并注册周期任务
    pub fn start(&mut self, configuration: &Configuration) -> Result<SocketAddr, ServerError> {
        info!("服务端版本 {}", env!("CARGO_PKG_VERSION"));

        let addr = self
            .state
            .server
            .start(configuration.port, configuration.max_clients as usize)?;

        self.tasks.add_delayed(
            |state: &mut RelayState| {
                state.collect_sessions();
                TaskResult::Repeat
            },
            configuration.session_collect_period(),
        );

        self.tasks.add_delayed(
            |state: &mut RelayState| {
                debug!("检查连接...");
                state.server.check_connections();
                TaskResult::Repeat
            },
            configuration.connection_check_period(),
        );

        Ok(addr)
    }

    pub fn stop(&mut self) {
        self.tasks.clear();
        self.state.server.stop();
    }

    /// 执行一帧
    pub fn update(&mut self) {
        self.state.server.accept_connections();

        while let Some((message, connection)) = self.state.server.next_message() {
            self.state.handle_message(&connection, &message);
        }

        self.tasks.update(&mut self.state);

        for connection in self.state.server.take_disconnected() {
            self.client_disconnected(&connection);
        }
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    /// 断开处理中不能直接发消息，通知对手的任务推迟执行
    fn client_disconnected(&mut self, connection: &Arc<ClientConnection>) {
        let Some(remote) = self.state.client_disconnected(connection) else {
            return;
        };

        self.tasks.add_deferred(move |state: &mut RelayState| {
            state
                .server
                .send_message(&remote, Message::new(MessageId::ServerRemoteLeaveGameSession));
            TaskResult::Done
        });
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}
