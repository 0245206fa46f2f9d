//! Sidebar entities: channels, folders, and the messages that patch them.
//!
//! A [`ChannelEntity`] is either a single subscribed feed ([`Channel`]) or a
//! [`Folder`] holding channels. Folders never nest.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Item Type
// ============================================================================

/// Discriminator for the two entity variants, as stored and sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Channel,
    Folder,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Channel => "channel",
            ItemType::Folder => "folder",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel" => Ok(ItemType::Channel),
            "folder" => Ok(ItemType::Folder),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A single subscribed feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub uuid: String,
    pub title: String,
    pub feed_url: String,
    /// Site link (the feed's HTML page), if known
    pub link: Option<String>,
    #[serde(default)]
    pub unread: i64,
    #[serde(default)]
    pub sort: i64,
}

/// A grouping container for channels.
///
/// `unread` is tracked on its own. Delta application under the default
/// traversal never derives it from `children`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub uuid: String,
    pub title: String,
    #[serde(default)]
    pub unread: i64,
    #[serde(default)]
    pub sort: i64,
    #[serde(default)]
    pub children: Vec<Channel>,
}

impl Folder {
    pub fn contains(&self, uuid: &str) -> bool {
        self.children.iter().any(|child| child.uuid == uuid)
    }
}

/// One row of the sidebar list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "item_type", rename_all = "lowercase")]
pub enum ChannelEntity {
    Channel(Channel),
    Folder(Folder),
}

impl ChannelEntity {
    pub fn uuid(&self) -> &str {
        match self {
            ChannelEntity::Channel(c) => &c.uuid,
            ChannelEntity::Folder(f) => &f.uuid,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ChannelEntity::Channel(c) => &c.title,
            ChannelEntity::Folder(f) => &f.title,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            ChannelEntity::Channel(_) => ItemType::Channel,
            ChannelEntity::Folder(_) => ItemType::Folder,
        }
    }

    pub fn unread(&self) -> i64 {
        match self {
            ChannelEntity::Channel(c) => c.unread,
            ChannelEntity::Folder(f) => f.unread,
        }
    }

    pub fn unread_mut(&mut self) -> &mut i64 {
        match self {
            ChannelEntity::Channel(c) => &mut c.unread,
            ChannelEntity::Folder(f) => &mut f.unread,
        }
    }

    pub fn sort(&self) -> i64 {
        match self {
            ChannelEntity::Channel(c) => c.sort,
            ChannelEntity::Folder(f) => f.sort,
        }
    }

    pub fn set_sort(&mut self, sort: i64) {
        match self {
            ChannelEntity::Channel(c) => c.sort = sort,
            ChannelEntity::Folder(f) => f.sort = sort,
        }
    }

    pub fn sort_entry(&self) -> SortEntry {
        SortEntry {
            uuid: self.uuid().to_string(),
            item_type: self.item_type(),
            sort: self.sort(),
        }
    }
}

/// Persisted ordering triple, one per top-level entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub uuid: String,
    pub item_type: ItemType,
    pub sort: i64,
}

// ============================================================================
// Count Deltas
// ============================================================================

/// Instruction carried by a count-delta event.
///
/// `Upgrade` is accepted on the wire and ignored. Unrecognized strings
/// deserialize to `Unknown` instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountAction {
    Increase,
    Decrease,
    Set,
    Upgrade,
    #[serde(other)]
    Unknown,
}

impl CountAction {
    /// Apply to `current`, clamping the result to zero.
    pub fn apply(self, current: i64, amount: i64) -> i64 {
        let next = match self {
            CountAction::Increase => current.saturating_add(amount),
            CountAction::Decrease => current.saturating_sub(amount),
            CountAction::Set => amount,
            CountAction::Upgrade | CountAction::Unknown => current,
        };
        next.max(0)
    }
}

/// A request to patch one entity's unread counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDelta {
    pub uuid: String,
    pub action: CountAction,
    #[serde(alias = "count")]
    pub amount: i64,
}

impl CountDelta {
    pub fn new(uuid: impl Into<String>, action: CountAction, amount: i64) -> Self {
        Self {
            uuid: uuid.into(),
            action,
            amount,
        }
    }
}

/// Per-user sync settings read at the start of every refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub threads: Option<usize>,
}
