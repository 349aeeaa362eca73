//! Middleware constructors.
//!
//! Middleware has the same argument shapes as handlers but produces no
//! value: `Ok(())` lets the chain continue, `Err(e)` aborts it and the
//! inbound message is answered with a failure Ack carrying `e`.

use std::fmt::Display;
use std::future::Future;

use gale_core::Codec;
use serde::de::DeserializeOwned;

use crate::handler::{self, Handler, PayloadShape};

/// A middleware step for context type `C`.
pub struct Middleware<C>(Handler<C>);

impl<C> Clone for Middleware<C> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<C> std::fmt::Debug for Middleware<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Middleware").field(&self.0).finish()
    }
}

impl<C: Send + 'static> Middleware<C> {
    /// Shape of the payload argument.
    pub fn shape(&self) -> PayloadShape {
        self.0.shape()
    }

    /// Run the step against an inbound payload.
    pub async fn invoke(&self, ctx: C, codec: &dyn Codec, raw: &str) -> Result<(), String> {
        self.0.invoke(ctx, codec, raw).await.map(|_| ())
    }
}

/// Middleware whose argument is decoded by the codec.
pub fn typed<C, T, E, F, Fut>(f: F) -> Middleware<C>
where
    C: Send + 'static,
    T: DeserializeOwned + Send + 'static,
    E: Display + Send + 'static,
    F: Fn(C, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    Middleware(handler::typed(f))
}

/// Middleware that receives the payload text unchanged.
pub fn text<C, E, F, Fut>(f: F) -> Middleware<C>
where
    C: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(C, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    Middleware(handler::text(f))
}

/// Middleware that receives the payload's bytes unchanged.
pub fn bytes<C, E, F, Fut>(f: F) -> Middleware<C>
where
    C: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(C, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    Middleware(handler::bytes(f))
}

/// Middleware that ignores the payload.
pub fn unit<C, E, F, Fut>(f: F) -> Middleware<C>
where
    C: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    Middleware(handler::unit(f))
}
