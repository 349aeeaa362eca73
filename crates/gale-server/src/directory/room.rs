//! A group of users on one plane with a host.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use gale_core::{ConnectionId, RoomId};
use parking_lot::RwLock;
use tracing::debug;

use super::{Directory, User};
use crate::errors::DirectoryError;

/// Room membership. The host's departure dissolves the room.
pub struct Room {
    id: RoomId,
    host: ConnectionId,
    directory: Weak<Directory>,
    members: RwLock<BTreeMap<ConnectionId, Arc<User>>>,
    page: AtomicUsize,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("members", &self.user_count())
            .field("page", &self.page())
            .finish()
    }
}

impl Room {
    pub(super) fn new(host: ConnectionId, directory: Weak<Directory>) -> Self {
        Self {
            id: RoomId::new(),
            host,
            directory,
            members: RwLock::new(BTreeMap::new()),
            page: AtomicUsize::new(0),
        }
    }

    /// Room id.
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Id of the hosting user.
    pub fn host_id(&self) -> &ConnectionId {
        &self.host
    }

    /// Directory page this room was placed on.
    pub fn page(&self) -> usize {
        self.page.load(Ordering::Relaxed)
    }

    pub(super) fn set_page(&self, page: usize) {
        self.page.store(page, Ordering::Relaxed);
    }

    /// Add `user`. Fails if the user is already in any room.
    pub fn add_user(self: &Arc<Self>, user: &Arc<User>) -> Result<(), DirectoryError> {
        if !user.claim_room(self) {
            return Err(DirectoryError::AlreadyInRoom(user.id().to_string()));
        }
        let mut members = self.members.write();
        if members.contains_key(user.id()) {
            drop(members);
            user.release_room(self);
            return Err(DirectoryError::AlreadyInRoom(user.id().to_string()));
        }
        let _ = members.insert(user.id().clone(), Arc::clone(user));
        Ok(())
    }

    /// Remove `user`. Removing the host clears every member's room and
    /// drops the room from the directory.
    pub fn remove_user(&self, user: &User) -> Result<(), DirectoryError> {
        if *user.id() == self.host {
            let members = std::mem::take(&mut *self.members.write());
            for member in members.values() {
                member.release_room(self);
            }
            user.release_room(self);
            if let Some(directory) = self.directory.upgrade() {
                directory.remove_room(&self.id);
            }
            debug!(room_id = %self.id, members = members.len(), "room dissolved");
            return Ok(());
        }

        let removed = self.members.write().remove(user.id());
        if removed.is_none() {
            return Err(DirectoryError::NotMember(user.id().to_string()));
        }
        user.release_room(self);
        Ok(())
    }

    /// Member by id.
    pub fn user(&self, id: &str) -> Option<Arc<User>> {
        self.members.read().get(id).cloned()
    }

    /// All members.
    pub fn users(&self) -> Vec<Arc<User>> {
        self.members.read().values().cloned().collect()
    }

    /// Number of members.
    pub fn user_count(&self) -> usize {
        self.members.read().len()
    }
}
