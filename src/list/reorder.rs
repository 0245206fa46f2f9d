use thiserror::Error;

use super::store::ChannelStore;
use crate::model::ChannelEntity;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderError {
    /// The uuid is not a top-level entity (folder children cannot be dragged)
    #[error("No top-level entity with uuid {0}")]
    NotFound(String),
}

impl ChannelStore {
    /// Position and entity for `uuid`, searching the top level only.
    pub fn find_by_uuid(&self, uuid: &str) -> Option<(usize, &ChannelEntity)> {
        self.entities
            .iter()
            .enumerate()
            .find(|(_, entity)| entity.uuid() == uuid)
    }

    /// Move a top-level entity.
    ///
    /// With `into_folder` the entity is only detached from the top level; the
    /// folder that received it is reloaded from the source. Otherwise the
    /// entity is removed and reinserted at `target_index`, counted after the
    /// removal and clamped to the end of the list. Every `sort` is then reset
    /// to its position.
    pub fn move_entity(
        &mut self,
        uuid: &str,
        target_index: usize,
        into_folder: bool,
    ) -> Result<(), ReorderError> {
        let (from, _) = self
            .find_by_uuid(uuid)
            .ok_or_else(|| ReorderError::NotFound(uuid.to_string()))?;

        let entity = self.entities.remove(from);
        if !into_folder {
            let to = target_index.min(self.entities.len());
            self.entities.insert(to, entity);
        }

        for (position, entity) in self.entities.iter_mut().enumerate() {
            entity.set_sort(position as i64);
        }

        tracing::debug!(uuid = %uuid, from, target_index, into_folder, "Moved entity");
        self.touch();
        Ok(())
    }
}
