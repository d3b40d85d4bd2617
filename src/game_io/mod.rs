//! Game I/O Adapter (spec §2.2, §6). A thin wrapper over the underlying
//! game-protocol library (packet framing, encryption, chunk loading are out
//! of scope per spec §1). Everything the Orchestrator needs is expressed as
//! a trait so Window Protocols can be driven in tests against an in-memory
//! fake instead of a live server connection.

pub mod fake;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::types::{ContainerSnapshot, ScoreboardSnapshot, Slot};

/// Mouse button used by the slot-click primitive (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Click mode, mirroring the game protocol's window-click packet modes
/// (spec §4.2 step 4 uses mode 3, a "middle-click"-equivalent; ordinary
/// clicks use mode 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMode {
    Normal,
    Shift,
    Hotbar,
    Middle,
    Drop,
}

/// A chat message with its color-stripped text readily accessible (spec
/// §6: "chat-message event with typed message objects offering a
/// color-stripped text accessor").
#[derive(Debug, Clone)]
pub struct ChatMessage {
    stripped: String,
}

impl ChatMessage {
    pub fn new(raw: &str) -> Self {
        Self { stripped: strip_color_codes(raw) }
    }

    pub fn text(&self) -> &str {
        &self.stripped
    }
}

/// Strip Minecraft `§x` color/formatting codes from a line.
pub fn strip_color_codes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\u{00a7}' {
            chars.next(); // consume the code character
        } else {
            out.push(c);
        }
    }
    out
}

/// Everything the Orchestrator needs from the underlying game-protocol
/// library (spec §6 "Game-I/O adapter contract").
#[async_trait]
pub trait GameIo: Send + Sync {
    async fn send_chat(&self, line: &str);

    fn subscribe_container_open(&self) -> broadcast::Receiver<ContainerSnapshot>;
    fn subscribe_container_close(&self) -> broadcast::Receiver<()>;
    fn subscribe_chat(&self) -> broadcast::Receiver<ChatMessage>;
    fn subscribe_sign_open(&self) -> broadcast::Receiver<()>;

    /// Current container view (title, typed slots), if one is open.
    fn current_container(&self) -> Option<ContainerSnapshot>;

    /// High-level slot click (spec §6 "slot-click primitive").
    async fn click_slot(&self, slot: u32, button: MouseButton, mode: ClickMode);

    /// Low-level raw `window_click` packet write, used by the AH Snipe
    /// protocol's speed-optimised confirm path (spec §4.2 step 3–4).
    async fn write_window_click_packet(&self, window_id: u8, slot: u32, button: u8, mode: u8);

    /// Low-level raw `transaction` packet write (spec §4.2 step 3).
    async fn write_transaction_packet(&self, window_id: u8, action_counter: i16, accepted: bool);

    /// Write a line of text into an open sign-entity editor (spec §4.3
    /// steps 4–5).
    async fn write_sign_line(&self, line_index: u8, text: &str);

    async fn close_container(&self);

    fn scoreboard(&self) -> ScoreboardSnapshot;
    fn inventory(&self) -> Vec<Slot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        let stripped = strip_color_codes("\u{00a7}aHello \u{00a7}lWorld");
        assert_eq!(stripped, "Hello World");
    }

    #[test]
    fn chat_message_exposes_stripped_text() {
        let msg = ChatMessage::new("\u{00a7}cYou purchased Hyper Sword for 1,000,000 coins!");
        assert_eq!(msg.text(), "You purchased Hyper Sword for 1,000,000 coins!");
    }
}
