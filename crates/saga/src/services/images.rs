//! Image storage service trait and in-memory implementation.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::ResourceId;

use crate::error::ServiceError;

const SERVICE: &str = "image service";

/// Object storage for card and profile images.
///
/// Images live either in the active bucket or in the trash bucket. Every
/// mutating call is safe to repeat: ids that are not where the call expects
/// them are skipped.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Stores new images in the active bucket and returns their ids in order.
    async fn upload(&self, file_names: &[String]) -> Result<Vec<ResourceId>, ServiceError>;

    /// Moves active images to the trash. Returns the ids actually moved.
    async fn move_to_trash(&self, ids: &[ResourceId]) -> Result<Vec<ResourceId>, ServiceError>;

    /// Moves trashed images back to the active bucket. Returns the ids moved.
    async fn restore_from_trash(&self, ids: &[ResourceId])
    -> Result<Vec<ResourceId>, ServiceError>;

    /// Deletes images from either bucket. Returns how many existed.
    async fn delete(&self, ids: &[ResourceId]) -> Result<usize, ServiceError>;
}

#[derive(Debug)]
struct InMemoryImageState {
    active: BTreeSet<ResourceId>,
    trash: BTreeSet<ResourceId>,
    next_id: i64,
    fail_on_upload: bool,
    fail_on_move: bool,
    fail_on_delete: bool,
}

impl Default for InMemoryImageState {
    fn default() -> Self {
        Self {
            active: BTreeSet::new(),
            trash: BTreeSet::new(),
            // First upload gets id 101.
            next_id: 100,
            fail_on_upload: false,
            fail_on_move: false,
            fail_on_delete: false,
        }
    }
}

/// In-memory image service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryImageService {
    state: Arc<RwLock<InMemoryImageState>>,
}

impl InMemoryImageService {
    /// Creates a new in-memory image service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail uploads.
    pub fn set_fail_on_upload(&self, fail: bool) {
        self.state.write().unwrap().fail_on_upload = fail;
    }

    /// Configures the service to fail moves between buckets.
    pub fn set_fail_on_move(&self, fail: bool) {
        self.state.write().unwrap().fail_on_move = fail;
    }

    /// Configures the service to fail deletes.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().unwrap().fail_on_delete = fail;
    }

    /// Returns true if the image is in the active bucket.
    pub fn is_active(&self, id: ResourceId) -> bool {
        self.state.read().unwrap().active.contains(&id)
    }

    /// Returns true if the image is in the trash bucket.
    pub fn is_trashed(&self, id: ResourceId) -> bool {
        self.state.read().unwrap().trash.contains(&id)
    }

    /// Returns true if the image is in neither bucket.
    pub fn is_gone(&self, id: ResourceId) -> bool {
        !self.is_active(id) && !self.is_trashed(id)
    }

    /// Returns the number of images in the active bucket.
    pub fn active_count(&self) -> usize {
        self.state.read().unwrap().active.len()
    }

    /// Stores an image directly in the active bucket.
    pub fn seed(&self, id: ResourceId) {
        self.state.write().unwrap().active.insert(id);
    }
}

#[async_trait]
impl ImageService for InMemoryImageService {
    async fn upload(&self, file_names: &[String]) -> Result<Vec<ResourceId>, ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_upload {
            return Err(ServiceError::unavailable(SERVICE, "upload failed"));
        }

        let mut ids = Vec::with_capacity(file_names.len());
        for _ in file_names {
            state.next_id += 1;
            let id = ResourceId::new(state.next_id);
            state.active.insert(id);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn move_to_trash(&self, ids: &[ResourceId]) -> Result<Vec<ResourceId>, ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_move {
            return Err(ServiceError::unavailable(SERVICE, "move to trash failed"));
        }

        let mut moved = Vec::new();
        for id in ids {
            if state.active.remove(id) {
                state.trash.insert(*id);
                moved.push(*id);
            }
        }
        Ok(moved)
    }

    async fn restore_from_trash(
        &self,
        ids: &[ResourceId],
    ) -> Result<Vec<ResourceId>, ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_move {
            return Err(ServiceError::unavailable(SERVICE, "restore failed"));
        }

        let mut moved = Vec::new();
        for id in ids {
            if state.trash.remove(id) {
                state.active.insert(*id);
                moved.push(*id);
            }
        }
        Ok(moved)
    }

    async fn delete(&self, ids: &[ResourceId]) -> Result<usize, ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_delete {
            return Err(ServiceError::unavailable(SERVICE, "delete failed"));
        }

        let mut removed = 0;
        for id in ids {
            if state.active.remove(id) | state.trash.remove(id) {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
