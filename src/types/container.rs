/// The primary signal driving AH Snipe dispatch (spec §3, §4.2) plus the
/// handful of other tags the remaining Window Protocols key off of. Items
/// outside this closed set still round-trip via `other`, so an unexpected
/// server-side item never panics the matcher. It falls into the "unexpected"
/// arm every protocol's match already has to handle (spec §4.2 step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotKind {
    GoldNugget,
    Bed,
    Potato,
    Feather,
    GoldBlock,
    PoisonousPotato,
    StainedGlassPane,
    Cookie,
    Cauldron,
    Air,
    Other(String),
}

impl SlotKind {
    pub fn from_item_id(id: &str) -> Self {
        match id {
            "gold_nugget" => SlotKind::GoldNugget,
            "bed" => SlotKind::Bed,
            "potato" => SlotKind::Potato,
            "feather" => SlotKind::Feather,
            "gold_block" => SlotKind::GoldBlock,
            "poisonous_potato" => SlotKind::PoisonousPotato,
            "stained_glass_pane" => SlotKind::StainedGlassPane,
            "cookie" => SlotKind::Cookie,
            "cauldron" => SlotKind::Cauldron,
            "air" => SlotKind::Air,
            other => SlotKind::Other(other.to_string()),
        }
    }
}

/// A single inventory-window slot (spec §3). `display_name` and `lore` are
/// already color-code-stripped by the Game I/O Adapter before they reach
/// the Orchestrator; no Window Protocol ever sees a `§`-prefixed code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub index: u32,
    pub kind_tag: SlotKind,
    pub display_name: String,
    pub lore: Vec<String>,
    pub item_db_id: Option<String>,
}

impl Slot {
    pub fn empty(index: u32) -> Self {
        Self {
            index,
            kind_tag: SlotKind::Air,
            display_name: String::new(),
            lore: Vec::new(),
            item_db_id: None,
        }
    }

    /// Case-insensitive, special-glyph-stripped containment check used by
    /// the Bazaar search-result fallback and Manage Orders scanning
    /// (spec §4.3 step 2, §4.4).
    pub fn display_name_contains(&self, needle: &str) -> bool {
        strip_glyphs(&self.display_name.to_ascii_lowercase())
            .contains(&strip_glyphs(&needle.to_ascii_lowercase()))
    }

    pub fn lore_contains_any(&self, needles: &[&str]) -> bool {
        let joined = self.lore.join(" ").to_ascii_lowercase();
        needles.iter().any(|n| joined.contains(n))
    }

    pub fn lore_contains_none(&self, needles: &[&str]) -> bool {
        !self.lore_contains_any(needles)
    }
}

/// Strip the handful of special glyphs Hypixel uses as bullet/corner
/// decoration in bazaar/auction item names so name matching is robust to
/// them (spec §4.3: "special-glyph-stripped").
fn strip_glyphs(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '✦' | '➜' | '✪' | '❈' | '⸕')).collect()
}

/// A snapshot of an open container window (spec §3).
#[derive(Debug, Clone)]
pub struct ContainerSnapshot {
    pub window_id: u8,
    pub title: String,
    pub slots: Vec<Slot>,
}

impl ContainerSnapshot {
    pub fn slot(&self, index: u32) -> Option<&Slot> {
        self.slots.iter().find(|s| s.index == index)
    }

    pub fn title_is(&self, expected: &str) -> bool {
        self.title == expected
    }

    pub fn next_window_id(&self) -> u8 {
        if self.window_id == 100 { 1 } else { self.window_id + 1 }
    }

    pub fn find_slot_containing(&self, needle: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.display_name_contains(needle))
    }
}
