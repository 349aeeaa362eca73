//! One accepted connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use gale_channel::Endpoint;
use gale_core::{CallError, ConnectionId, Plane};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Directory, Room};
use crate::context::ServerContext;
use crate::errors::DirectoryError;

/// Acceptor-side handle for one connection on one plane.
pub struct User {
    id: ConnectionId,
    endpoint: Arc<Endpoint<ServerContext>>,
    directory: Weak<Directory>,
    room: RwLock<Weak<Room>>,
    page: AtomicUsize,
    extra: DashMap<String, Value>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("plane", &self.plane())
            .field("room", &self.room().map(|r| r.id().clone()))
            .field("page", &self.page())
            .finish_non_exhaustive()
    }
}

impl User {
    pub(super) fn new(endpoint: Arc<Endpoint<ServerContext>>, directory: Weak<Directory>) -> Self {
        Self {
            id: endpoint.id().clone(),
            endpoint,
            directory,
            room: RwLock::new(Weak::new()),
            page: AtomicUsize::new(0),
            extra: DashMap::new(),
        }
    }

    /// Connection id (shared with the endpoint).
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Plane this connection arrived on.
    pub fn plane(&self) -> Plane {
        self.endpoint.plane()
    }

    /// The connection's endpoint.
    pub fn endpoint(&self) -> &Arc<Endpoint<ServerContext>> {
        &self.endpoint
    }

    /// Directory page this user was placed on.
    pub fn page(&self) -> usize {
        self.page.load(Ordering::Relaxed)
    }

    pub(super) fn set_page(&self, page: usize) {
        self.page.store(page, Ordering::Relaxed);
    }

    /// Room the user is in, if any.
    pub fn room(&self) -> Option<Arc<Room>> {
        self.room.read().upgrade()
    }

    /// Point the user at `room` unless they are already in a live one. The
    /// check and the write happen under one lock.
    pub(super) fn claim_room(&self, room: &Arc<Room>) -> bool {
        let mut slot = self.room.write();
        if slot.upgrade().is_some() {
            return false;
        }
        *slot = Arc::downgrade(room);
        true
    }

    /// Clear the room pointer if it still points at `room`.
    pub(super) fn release_room(&self, room: &Room) {
        let mut slot = self.room.write();
        if std::ptr::eq(slot.as_ptr(), room) {
            *slot = Weak::new();
        }
    }

    /// Join an existing room.
    pub fn join_room(self: &Arc<Self>, room: &Arc<Room>) -> Result<(), DirectoryError> {
        room.add_user(self)
    }

    /// Create a room hosted by this user and join it.
    pub fn create_and_join_room(self: &Arc<Self>) -> Result<Arc<Room>, DirectoryError> {
        if self.room().is_some() {
            return Err(DirectoryError::AlreadyInRoom(self.id.to_string()));
        }
        let directory = self.directory.upgrade().ok_or(DirectoryError::Closed)?;
        directory.host_room(self)
    }

    /// Leave the current room. Leaving as host dissolves the room.
    pub fn leave_room(&self) -> Result<(), DirectoryError> {
        let room = self
            .room()
            .ok_or_else(|| DirectoryError::NotInRoom(self.id.to_string()))?;
        room.remove_user(self)
    }

    /// Store a per-connection value.
    pub fn set_extra(&self, key: impl Into<String>, value: Value) {
        let _ = self.extra.insert(key.into(), value);
    }

    /// Read a per-connection value.
    pub fn extra(&self, key: &str) -> Option<Value> {
        self.extra.get(key).map(|v| v.value().clone())
    }

    /// Fire-and-forget message to this user.
    pub async fn push<T: Serialize + ?Sized>(
        &self,
        route: &str,
        payload: &T,
    ) -> Result<(), CallError> {
        self.endpoint.push(route, payload).await
    }

    /// Request and wait for the reply. Calling this from a handler running
    /// on the same connection times out; use
    /// [`ServerContext::request_async`] there.
    pub async fn request<T, R>(&self, route: &str, payload: &T) -> Result<R, CallError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.endpoint.request(route, payload).await
    }

    /// Request that gives up when `cancel` fires.
    pub async fn request_with_cancel<T, R>(
        &self,
        route: &str,
        payload: &T,
        cancel: &CancellationToken,
    ) -> Result<R, CallError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.endpoint.request_with_cancel(route, payload, cancel).await
    }
}
