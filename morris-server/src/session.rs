//! 对局会话

use std::sync::{Arc, Weak};

use protocol::payload::ChatMessage;
use protocol::{ClockTime, GameMode, Player, SessionId};

use crate::network::ClientConnection;

/// 会话中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub fn other(self) -> Self {
        match self {
            Slot::First => Slot::Second,
            Slot::Second => Slot::First,
        }
    }
}

/// 两名玩家之间的一局对局
///
/// 会话只弱引用连接：连接被网络层丢弃后，对应位置自动变为空位，
/// 原玩家（或任何人）可以重新加入。
#[derive(Debug)]
pub struct GameSession {
    pub id: SessionId,
    pub game_mode: GameMode,
    pub initial_time: ClockTime,
    /// 位置 1 玩家执的棋色
    pub player1: Player,
    connection1: Weak<ClientConnection>,
    connection2: Weak<ClientConnection>,
    name1: String,
    name2: String,
    time1: ClockTime,
    time2: ClockTime,
    /// 走法历史（不透明字符串）
    pub moves: Vec<String>,
    /// 聊天记录
    pub messages: Vec<ChatMessage>,
    pub game_over: bool,
    rematch1: bool,
    rematch2: bool,
}

impl GameSession {
    /// 创建会话，创建者占据位置 1
    pub fn new(
        id: SessionId,
        game_mode: GameMode,
        initial_time: ClockTime,
        player1: Player,
        connection: &Arc<ClientConnection>,
        name: String,
    ) -> Self {
        Self {
            id,
            game_mode,
            initial_time,
            player1,
            connection1: Arc::downgrade(connection),
            connection2: Weak::new(),
            name1: name,
            name2: String::new(),
            time1: initial_time,
            time2: initial_time,
            moves: Vec::new(),
            messages: Vec::new(),
            game_over: false,
            rematch1: false,
            rematch2: false,
        }
    }

    /// 连接所在的位置
    pub fn slot_of(&self, connection: &Arc<ClientConnection>) -> Option<Slot> {
        // 弱引用存在期间分配不会被释放，指针比较不会误判
        let target = Arc::as_ptr(connection);

        if std::ptr::eq(self.connection1.as_ptr(), target) && self.connection1.strong_count() > 0 {
            Some(Slot::First)
        } else if std::ptr::eq(self.connection2.as_ptr(), target) && self.connection2.strong_count() > 0 {
            Some(Slot::Second)
        } else {
            None
        }
    }

    /// 位置上的连接（已断开则为 None）
    pub fn connection(&self, slot: Slot) -> Option<Arc<ClientConnection>> {
        self.weak(slot).upgrade()
    }

    /// 对手的连接
    pub fn remote(&self, slot: Slot) -> Option<Arc<ClientConnection>> {
        self.connection(slot.other())
    }

    pub fn is_vacant(&self, slot: Slot) -> bool {
        self.weak(slot).strong_count() == 0
    }

    /// 两个位置都已空出，可以回收
    pub fn is_abandoned(&self) -> bool {
        self.is_vacant(Slot::First) && self.is_vacant(Slot::Second)
    }

    /// 第一个空位（优先位置 1）
    pub fn vacant_slot(&self) -> Option<Slot> {
        [Slot::First, Slot::Second]
            .into_iter()
            .find(|&slot| self.is_vacant(slot))
    }

    /// 占据位置
    pub fn occupy(&mut self, slot: Slot, connection: &Arc<ClientConnection>, name: String) {
        match slot {
            Slot::First => {
                self.connection1 = Arc::downgrade(connection);
                self.name1 = name;
            }
            Slot::Second => {
                self.connection2 = Arc::downgrade(connection);
                self.name2 = name;
            }
        }
    }

    /// 空出位置
    pub fn vacate(&mut self, slot: Slot) {
        match slot {
            Slot::First => self.connection1 = Weak::new(),
            Slot::Second => self.connection2 = Weak::new(),
        }
    }

    /// 位置上的玩家执的棋色
    pub fn player(&self, slot: Slot) -> Player {
        match slot {
            Slot::First => self.player1,
            Slot::Second => self.player1.opponent(),
        }
    }

    pub fn name(&self, slot: Slot) -> &str {
        match slot {
            Slot::First => &self.name1,
            Slot::Second => &self.name2,
        }
    }

    pub fn time(&self, slot: Slot) -> ClockTime {
        match slot {
            Slot::First => self.time1,
            Slot::Second => self.time2,
        }
    }

    pub fn set_time(&mut self, slot: Slot, time: ClockTime) {
        match slot {
            Slot::First => self.time1 = time,
            Slot::Second => self.time2 = time,
        }
    }

    /// 记录再来一局请求，双方都同意时返回 true
    pub fn request_rematch(&mut self, slot: Slot) -> bool {
        match slot {
            Slot::First => self.rematch1 = true,
            Slot::Second => self.rematch2 = true,
        }

        self.rematch_agreed()
    }

    pub fn cancel_rematch(&mut self, slot: Slot) {
        match slot {
            Slot::First => self.rematch1 = false,
            Slot::Second => self.rematch2 = false,
        }
    }

    pub fn rematch_agreed(&self) -> bool {
        self.rematch1 && self.rematch2
    }

    /// 开始新的一局：交换棋色，清空走法，重置计时
    pub fn restart(&mut self) {
        self.player1 = self.player1.opponent();
        self.moves.clear();
        self.time1 = self.initial_time;
        self.time2 = self.initial_time;
        self.game_over = false;
        self.rematch1 = false;
        self.rematch2 = false;
    }

    fn weak(&self, slot: Slot) -> &Weak<ClientConnection> {
        match slot {
            Slot::First => &self.connection1,
            Slot::Second => &self.connection2,
        }
    }
}
