//! Users and rooms of one plane, with paged listings.
//!
//! Accepted connections are registered on upgrade and unregistered (leaving
//! their room) on disconnect. Each plane owns its own directory.

mod paged;
mod room;
mod user;

use std::sync::Arc;

use gale_channel::Endpoint;
use gale_core::Plane;
use tracing::debug;

pub use paged::PagedIndex;
pub use room::Room;
pub use user::User;

use crate::context::ServerContext;
use crate::errors::DirectoryError;

/// Users and rooms of one plane.
#[derive(Debug)]
pub struct Directory {
    plane: Plane,
    users: PagedIndex<User>,
    rooms: PagedIndex<Room>,
}

impl Directory {
    /// Empty directory with the given page size.
    pub fn new(plane: Plane, page_size: usize) -> Arc<Self> {
        Arc::new(Self {
            plane,
            users: PagedIndex::new(page_size),
            rooms: PagedIndex::new(page_size),
        })
    }

    /// Plane this directory belongs to.
    pub fn plane(&self) -> Plane {
        self.plane
    }

    /// Wrap a freshly accepted endpoint as a user and index it.
    pub fn register(
        self: &Arc<Self>,
        endpoint: Arc<Endpoint<ServerContext>>,
    ) -> Result<Arc<User>, DirectoryError> {
        let user = Arc::new(User::new(endpoint, Arc::downgrade(self)));
        let page = self.users.insert(user.id(), Arc::clone(&user))?;
        user.set_page(page);
        Ok(user)
    }

    /// Drop a user from the index, leaving its room first.
    pub fn unregister(&self, id: &str) -> Option<Arc<User>> {
        let user = self.users.remove(id)?;
        if user.room().is_some() {
            if let Err(error) = user.leave_room() {
                debug!(conn_id = %id, %error, "leave on disconnect failed");
            }
        }
        Some(user)
    }

    pub(crate) fn create_room(self: &Arc<Self>, host: &User) -> Result<Arc<Room>, DirectoryError> {
        let room = Arc::new(Room::new(host.id().clone(), Arc::downgrade(self)));
        let page = self.rooms.insert(room.id(), Arc::clone(&room))?;
        room.set_page(page);
        debug!(room_id = %room.id(), host = %host.id(), page, "room created");
        Ok(room)
    }

    /// Create a room hosted by `host` and add the host to it. If the host
    /// turns out to be in another room already, the new room is removed
    /// again before returning the error.
    pub(crate) fn host_room(
        self: &Arc<Self>,
        host: &Arc<User>,
    ) -> Result<Arc<Room>, DirectoryError> {
        let room = self.create_room(host)?;
        if let Err(error) = room.add_user(host) {
            self.remove_room(room.id());
            debug!(room_id = %room.id(), host = %host.id(), "room discarded: host in another room");
            return Err(error);
        }
        Ok(room)
    }

    pub(crate) fn remove_room(&self, id: &str) {
        let _ = self.rooms.remove(id);
    }

    /// User by id.
    pub fn user(&self, id: &str) -> Option<Arc<User>> {
        self.users.get(id)
    }

    /// Every user.
    pub fn users(&self) -> Vec<Arc<User>> {
        self.users.all()
    }

    /// Users on `page`.
    pub fn users_by_page(&self, page: usize) -> Vec<Arc<User>> {
        self.users.page(page)
    }

    /// Number of users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Room by id.
    pub fn room(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.get(id)
    }

    /// Every room.
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.all()
    }

    /// Rooms on `page`.
    pub fn rooms_by_page(&self, page: usize) -> Vec<Arc<Room>> {
        self.rooms.page(page)
    }

    /// Number of rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
