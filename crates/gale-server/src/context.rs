//! Context handed to acceptor-side handlers and middleware.

use std::sync::Arc;

use gale_core::CallError;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::directory::{Directory, Room, User};
use crate::server::GaleServer;

/// The connection a message arrived on, plus the owning server.
#[derive(Clone, Debug)]
pub struct ServerContext {
    user: Arc<User>,
    server: GaleServer,
}

impl ServerContext {
    /// Context for messages from `user`.
    pub fn new(user: Arc<User>, server: GaleServer) -> Self {
        Self { user, server }
    }

    /// Sending connection.
    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    /// Room of the sending connection, if any.
    pub fn room(&self) -> Option<Arc<Room>> {
        self.user.room()
    }

    /// The server that accepted the connection.
    pub fn server(&self) -> &GaleServer {
        &self.server
    }

    /// Directory of the plane the message arrived on.
    pub fn directory(&self) -> &Arc<Directory> {
        self.server.directory(self.user.plane())
    }

    /// Request the sending connection without waiting. `callback` gets a
    /// clone of this context with the decoded reply, so it can reply on,
    /// push to the room, or look up the directory.
    pub async fn request_async<T, R, F>(
        &self,
        route: &str,
        payload: &T,
        callback: F,
    ) -> Result<(), CallError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned + 'static,
        F: FnOnce(ServerContext, R) + Send + 'static,
    {
        self.user
            .endpoint()
            .request_async(route, payload, self.clone(), callback)
            .await
    }
}
