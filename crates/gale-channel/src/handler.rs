//! Type-erased route handlers.
//!
//! A handler takes the plane's context value plus at most one payload
//! argument and returns `Result<R, E>`. The payload argument has one of a
//! closed set of shapes, fixed by the constructor used:
//!
//! | constructor | argument              | decoded by          |
//! |-------------|-----------------------|---------------------|
//! | [`typed`]   | any `DeserializeOwned` | the plane's codec   |
//! | [`text`]    | `String`              | passed through raw  |
//! | [`bytes`]   | `Vec<u8>`             | passed through raw  |
//! | [`unit`]    | none                  | ignored             |
//!
//! The result is encoded with the codec; a result that encodes to `null`
//! (such as `()`) becomes the empty payload.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use gale_core::Codec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Boxed future returned by erased handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Declared shape of a handler's payload argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadShape {
    /// Decoded with the codec into the handler's argument type.
    Typed,
    /// Raw payload text.
    Text,
    /// Raw payload bytes.
    Bytes,
    /// No payload argument.
    Unit,
}

/// Payload after shape-directed decoding.
#[derive(Debug)]
pub enum Payload {
    /// Codec-decoded value tree.
    Value(Value),
    /// Raw text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Nothing.
    Empty,
}

type ErasedFuture = BoxFuture<'static, Result<Value, String>>;
type ErasedFn<C> = dyn Fn(C, Payload) -> ErasedFuture + Send + Sync;

/// A registered route handler for context type `C`.
pub struct Handler<C> {
    shape: PayloadShape,
    call: Arc<ErasedFn<C>>,
}

impl<C> Clone for Handler<C> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape,
            call: Arc::clone(&self.call),
        }
    }
}

impl<C> std::fmt::Debug for Handler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("shape", &self.shape).finish_non_exhaustive()
    }
}

impl<C: Send + 'static> Handler<C> {
    /// Shape of the payload argument.
    pub fn shape(&self) -> PayloadShape {
        self.shape
    }

    /// Decode `raw` per the declared shape, run the handler, and encode its
    /// result. Any failure is returned as the text for a failure Ack.
    pub async fn invoke(&self, ctx: C, codec: &dyn Codec, raw: &str) -> Result<String, String> {
        let payload = match self.shape {
            PayloadShape::Typed => {
                Payload::Value(codec.decode_value(raw).map_err(|e| e.to_string())?)
            }
            PayloadShape::Text => Payload::Text(raw.to_owned()),
            PayloadShape::Bytes => Payload::Bytes(raw.as_bytes().to_vec()),
            PayloadShape::Unit => Payload::Empty,
        };
        let value = (self.call)(ctx, payload).await?;
        codec.encode_value(&value).map_err(|e| e.to_string())
    }
}

fn finish<R, E>(outcome: Result<R, E>) -> Result<Value, String>
where
    R: Serialize,
    E: Display,
{
    let result = outcome.map_err(|e| e.to_string())?;
    serde_json::to_value(result).map_err(|e| format!("encode failed: {e}"))
}

fn shape_mismatch() -> ErasedFuture {
    Box::pin(async { Err("payload shape mismatch".to_owned()) })
}

/// Handler whose argument is decoded by the codec.
pub fn typed<C, T, R, E, F, Fut>(f: F) -> Handler<C>
where
    C: Send + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Display + Send + 'static,
    F: Fn(C, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    Handler {
        shape: PayloadShape::Typed,
        call: Arc::new(move |ctx: C, payload: Payload| -> ErasedFuture {
            let Payload::Value(value) = payload else {
                return shape_mismatch();
            };
            let arg: T = match serde_json::from_value(value) {
                Ok(arg) => arg,
                Err(e) => {
                    let message = format!("decode failed: {e}");
                    return Box::pin(async move { Err(message) });
                }
            };
            let fut = f(ctx, arg);
            Box::pin(async move { finish(fut.await) })
        }),
    }
}

/// Handler that receives the payload text unchanged.
pub fn text<C, R, E, F, Fut>(f: F) -> Handler<C>
where
    C: Send + 'static,
    R: Serialize + Send + 'static,
    E: Display + Send + 'static,
    F: Fn(C, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    Handler {
        shape: PayloadShape::Text,
        call: Arc::new(move |ctx: C, payload: Payload| -> ErasedFuture {
            let Payload::Text(raw) = payload else {
                return shape_mismatch();
            };
            let fut = f(ctx, raw);
            Box::pin(async move { finish(fut.await) })
        }),
    }
}

/// Handler that receives the payload's bytes unchanged.
pub fn bytes<C, R, E, F, Fut>(f: F) -> Handler<C>
where
    C: Send + 'static,
    R: Serialize + Send + 'static,
    E: Display + Send + 'static,
    F: Fn(C, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    Handler {
        shape: PayloadShape::Bytes,
        call: Arc::new(move |ctx: C, payload: Payload| -> ErasedFuture {
            let Payload::Bytes(raw) = payload else {
                return shape_mismatch();
            };
            let fut = f(ctx, raw);
            Box::pin(async move { finish(fut.await) })
        }),
    }
}

/// Handler that takes no payload.
pub fn unit<C, R, E, F, Fut>(f: F) -> Handler<C>
where
    C: Send + 'static,
    R: Serialize + Send + 'static,
    E: Display + Send + 'static,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    Handler {
        shape: PayloadShape::Unit,
        call: Arc::new(move |ctx: C, _payload: Payload| -> ErasedFuture {
            let fut = f(ctx);
            Box::pin(async move { finish(fut.await) })
        }),
    }
}
