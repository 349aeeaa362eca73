//! Opening endpoints and following least-loaded redirects.
//!
//! The connect sequence:
//! 1. open the system plane to the current target
//! 2. ask `/get_low_load_server_addr` whether a less loaded server exists
//! 3. an empty reply (or the current target) means stay: open the user plane
//! 4. otherwise close the system plane and start over at the returned
//!    address, this time without asking for a new one
//!
//! Redirect chains are bounded by [`MAX_REDIRECTS`].

use std::sync::Arc;

use gale_channel::{DualChannel, Endpoint, Router, dispatcher};
use gale_core::constants::{MAX_REDIRECTS, ROUTE_LOW_LOAD_ADDR};
use gale_core::{Plane, TransportError};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::transport;

/// Dial one plane of `target` and start its dispatcher.
pub async fn open_endpoint<C>(
    config: &ClientConfig,
    target: &str,
    plane: Plane,
    router: Arc<Router<C>>,
    ctx: C,
) -> Result<Arc<Endpoint<C>>, TransportError>
where
    C: Clone + Send + 'static,
{
    let url = config.url(target, plane);
    let (reader, writer) = transport::dial(&url).await?;
    let endpoint = Arc::new(Endpoint::new(
        plane,
        router,
        Arc::clone(&config.codec),
        writer,
        config.timeout,
    ));
    drop(dispatcher::spawn(Arc::clone(&endpoint), reader, ctx));
    Ok(endpoint)
}

/// Open both planes, following redirects. Returns the address that was
/// settled on together with the session.
pub async fn connect_dual<C>(
    config: &ClientConfig,
    user_router: &Arc<Router<C>>,
    system_router: &Arc<Router<C>>,
    ctx_for: impl Fn(Plane) -> C,
) -> Result<(String, DualChannel<C>), ClientError>
where
    C: Clone + Send + 'static,
{
    let mut target = config.target();
    let mut wants_new_address = !config.direct_connect;

    for hop in 0..=MAX_REDIRECTS {
        let system = open_endpoint(
            config,
            &target,
            Plane::System,
            Arc::clone(system_router),
            ctx_for(Plane::System),
        )
        .await?;

        let reply: String = match system.request(ROUTE_LOW_LOAD_ADDR, &wants_new_address).await {
            Ok(reply) => reply,
            Err(error) => {
                let _ = system.close().await;
                return Err(error.into());
            }
        };

        if reply.is_empty() || reply == target {
            let user = match open_endpoint(
                config,
                &target,
                Plane::User,
                Arc::clone(user_router),
                ctx_for(Plane::User),
            )
            .await
            {
                Ok(user) => user,
                Err(error) => {
                    let _ = system.close().await;
                    return Err(error.into());
                }
            };
            info!(address = %target, hops = hop, "connected");
            return Ok((target, DualChannel::new(user, system)));
        }

        debug!(from = %target, to = %reply, "redirected to a less loaded server");
        let _ = system.close().await;
        target = reply;
        wants_new_address = false;
    }

    Err(ClientError::TooManyRedirects(MAX_REDIRECTS))
}
