use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{ChannelEntity, SortEntry};

/// How a count delta aimed at a folder child is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountTraversal {
    /// Patch the matched top-level entity only. A delta for a folder child
    /// lands on the folder's own counter; the child keeps its value.
    #[default]
    Container,
    /// Patch the child itself, then recompute the folder as the sum of its
    /// children.
    Nested,
}

/// Snapshot published to viewers after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListView {
    pub entities: Vec<ChannelEntity>,
    /// Bumped on every notification, including no-op deltas
    pub revision: u64,
    pub refreshing: bool,
    pub done: usize,
    pub total: usize,
}

impl ListView {
    /// Refresh progress as a whole percentage, rounded up.
    pub fn progress_percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let done = self.done.min(self.total);
        (done * 100).div_ceil(self.total) as u8
    }
}

/// The in-memory list and its refresh state.
///
/// Owned by a single task; every mutation goes through `&mut self`.
#[derive(Debug, Default)]
pub struct ChannelStore {
    pub(super) entities: Vec<ChannelEntity>,
    pub(super) revision: u64,
    pub(super) traversal: CountTraversal,
    pub(super) refreshing: bool,
    pub(super) done: usize,
    pub(super) total: usize,
}

impl ChannelStore {
    pub fn new(traversal: CountTraversal) -> Self {
        Self {
            traversal,
            ..Default::default()
        }
    }

    pub fn entities(&self) -> &[ChannelEntity] {
        &self.entities
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn traversal(&self) -> CountTraversal {
        self.traversal
    }

    /// Replace the whole list, merging `totals` into every entity and every
    /// folder child. Missing uuids read as zero.
    pub fn replace(&mut self, mut entities: Vec<ChannelEntity>, totals: &HashMap<String, i64>) {
        let total_of = |uuid: &str| totals.get(uuid).copied().unwrap_or(0).max(0);

        for entity in &mut entities {
            match entity {
                ChannelEntity::Channel(channel) => channel.unread = total_of(&channel.uuid),
                ChannelEntity::Folder(folder) => {
                    folder.unread = total_of(&folder.uuid);
                    for child in &mut folder.children {
                        child.unread = total_of(&child.uuid);
                    }
                }
            }
        }

        self.entities = entities;
        self.touch();
    }

    /// The persisted-order triples for the current top level.
    pub fn sort_entries(&self) -> Vec<SortEntry> {
        self.entities.iter().map(ChannelEntity::sort_entry).collect()
    }

    pub(super) fn begin_refresh(&mut self, total: usize) {
        self.refreshing = true;
        self.done = 0;
        self.total = total;
        self.touch();
    }

    pub(super) fn set_progress(&mut self, done: usize, total: usize) {
        self.done = done;
        self.total = total;
        self.touch();
    }

    pub(super) fn finish_refresh(&mut self) {
        self.refreshing = false;
        self.done = 0;
        self.touch();
    }

    pub(super) fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn view(&self) -> ListView {
        ListView {
            entities: self.entities.clone(),
            revision: self.revision,
            refreshing: self.refreshing,
            done: self.done,
            total: self.total,
        }
    }
}
