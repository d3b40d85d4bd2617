//! An in-memory `GameIo` used by the end-to-end scenario tests (spec §8
//! S1–S6) and by Window Protocol unit tests. Lets a test script drive
//! container-open/close, chat lines, and inspect every click/packet the
//! protocol under test issued, without a live server connection.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{ChatMessage, ClickMode, GameIo, MouseButton};
use crate::types::{ContainerSnapshot, ScoreboardSnapshot, Slot};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedClick {
    pub slot: u32,
    pub button: MouseButton,
    pub mode: ClickMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWindowClickPacket {
    pub window_id: u8,
    pub slot: u32,
    pub button: u8,
    pub mode: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTransactionPacket {
    pub window_id: u8,
    pub action_counter: i16,
    pub accepted: bool,
}

pub struct FakeGameIo {
    container_open_tx: broadcast::Sender<ContainerSnapshot>,
    container_close_tx: broadcast::Sender<()>,
    chat_tx: broadcast::Sender<ChatMessage>,
    sign_open_tx: broadcast::Sender<()>,

    current_container: Mutex<Option<ContainerSnapshot>>,
    scoreboard: Mutex<ScoreboardSnapshot>,
    inventory: Mutex<Vec<Slot>>,

    pub sent_chat: Mutex<Vec<String>>,
    pub clicks: Mutex<Vec<RecordedClick>>,
    pub window_click_packets: Mutex<Vec<RecordedWindowClickPacket>>,
    pub transaction_packets: Mutex<Vec<RecordedTransactionPacket>>,
    pub sign_lines: Mutex<Vec<(u8, String)>>,
    pub close_count: Mutex<u32>,
}

impl FakeGameIo {
    pub fn new() -> Self {
        let (container_open_tx, _) = broadcast::channel(64);
        let (container_close_tx, _) = broadcast::channel(64);
        let (chat_tx, _) = broadcast::channel(256);
        let (sign_open_tx, _) = broadcast::channel(16);
        Self {
            container_open_tx,
            container_close_tx,
            chat_tx,
            sign_open_tx,
            current_container: Mutex::new(None),
            scoreboard: Mutex::new(ScoreboardSnapshot::default()),
            inventory: Mutex::new(Vec::new()),
            sent_chat: Mutex::new(Vec::new()),
            clicks: Mutex::new(Vec::new()),
            window_click_packets: Mutex::new(Vec::new()),
            transaction_packets: Mutex::new(Vec::new()),
            sign_lines: Mutex::new(Vec::new()),
            close_count: Mutex::new(0),
        }
    }

    /// Drive a container-open event, as if the server had just sent one.
    pub fn open_container(&self, snapshot: ContainerSnapshot) {
        *self.current_container.lock() = Some(snapshot.clone());
        let _ = self.container_open_tx.send(snapshot);
    }

    /// Mutate the open container's slots in place and re-fire the open
    /// event; used to simulate the server repopulating slot 31 mid-poll
    /// (spec §4.2 step 4's "feather" re-poll).
    pub fn update_container(&self, f: impl FnOnce(&mut ContainerSnapshot)) {
        let mut guard = self.current_container.lock();
        if let Some(snapshot) = guard.as_mut() {
            f(snapshot);
            let _ = self.container_open_tx.send(snapshot.clone());
        }
    }

    pub fn push_chat(&self, line: &str) {
        let _ = self.chat_tx.send(ChatMessage::new(line));
    }

    pub fn fire_sign_open(&self) {
        let _ = self.sign_open_tx.send(());
    }

    pub fn set_scoreboard(&self, sb: ScoreboardSnapshot) {
        *self.scoreboard.lock() = sb;
    }

    pub fn set_inventory(&self, slots: Vec<Slot>) {
        *self.inventory.lock() = slots;
    }
}

impl Default for FakeGameIo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameIo for FakeGameIo {
    async fn send_chat(&self, line: &str) {
        self.sent_chat.lock().push(line.to_string());
    }

    fn subscribe_container_open(&self) -> broadcast::Receiver<ContainerSnapshot> {
        self.container_open_tx.subscribe()
    }

    fn subscribe_container_close(&self) -> broadcast::Receiver<()> {
        self.container_close_tx.subscribe()
    }

    fn subscribe_chat(&self) -> broadcast::Receiver<ChatMessage> {
        self.chat_tx.subscribe()
    }

    fn subscribe_sign_open(&self) -> broadcast::Receiver<()> {
        self.sign_open_tx.subscribe()
    }

    fn current_container(&self) -> Option<ContainerSnapshot> {
        self.current_container.lock().clone()
    }

    async fn click_slot(&self, slot: u32, button: MouseButton, mode: ClickMode) {
        self.clicks.lock().push(RecordedClick { slot, button, mode });
    }

    async fn write_window_click_packet(&self, window_id: u8, slot: u32, button: u8, mode: u8) {
        self.window_click_packets
            .lock()
            .push(RecordedWindowClickPacket { window_id, slot, button, mode });
    }

    async fn write_transaction_packet(&self, window_id: u8, action_counter: i16, accepted: bool) {
        self.transaction_packets
            .lock()
            .push(RecordedTransactionPacket { window_id, action_counter, accepted });
    }

    async fn write_sign_line(&self, line_index: u8, text: &str) {
        self.sign_lines.lock().push((line_index, text.to_string()));
    }

    async fn close_container(&self) {
        *self.current_container.lock() = None;
        *self.close_count.lock() += 1;
        let _ = self.container_close_tx.send(());
    }

    fn scoreboard(&self) -> ScoreboardSnapshot {
        self.scoreboard.lock().clone()
    }

    fn inventory(&self) -> Vec<Slot> {
        self.inventory.lock().clone()
    }
}
