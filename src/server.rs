// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! TCP server answering [routing requests](crate::protocol), one per connection.
//!
//! Every accepted connection is handled by its own task; the CPU-bound part
//! (loading the map, building the index, searching) runs on tokio's blocking pool.
//! Each request works on its own search state, so requests never observe each other.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::protocol::{self, RouteRequest, RouteResponse, MAX_FRAME_LEN};
use crate::{GraphSource, RouteError, DEFAULT_STEP_LIMIT};

/// Port of the routing socket, unless configured otherwise.
pub const DEFAULT_PORT: u16 = 9595;

/// Default limit of concurrently handled connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// Pause after a failed `accept`, e.g. when running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// What to do with new connections when [ServerConfig::max_connections] are already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Admission {
    /// Stop accepting until a connection finishes;
    /// new clients wait in the listen backlog.
    #[default]
    Wait,

    /// Accept and immediately close excess connections.
    Reject,
}

/// Settings of a routing [Server].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: SocketAddr,

    /// Where the network for each request comes from.
    pub graph: GraphSource,

    /// Maximum number of concurrently handled connections.
    pub max_connections: usize,

    pub admission: Admission,

    /// Limit on the whole exchange with a single client. `None` waits indefinitely.
    ///
    /// Expiry closes the connection, but a route search which has
    /// already started still runs to completion on the blocking pool,
    /// and keeps its slot of [ServerConfig::max_connections] until then.
    pub request_timeout: Option<Duration>,

    /// Passed to [find_route](crate::find_route).
    pub step_limit: usize,
}

impl ServerConfig {
    pub fn new(graph: GraphSource) -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            graph,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            admission: Admission::default(),
            request_timeout: None,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error(transparent)]
    Protocol(#[from] protocol::Error),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("request handler panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Listens for routing requests. See the [module docs](self).
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Binds to [ServerConfig::bind].
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        Ok(Self::from_listener(listener, config))
    }

    /// Uses an already bound listener; [ServerConfig::bind] is ignored.
    pub fn from_listener(listener: TcpListener, config: ServerConfig) -> Self {
        Self {
            listener,
            config: Arc::new(config),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` is cancelled, then waits
    /// for all in-flight requests to finish.
    pub async fn run(self, shutdown: CancellationToken) -> io::Result<()> {
        let max_connections = self.config.max_connections.max(1);
        let limiter = Arc::new(Semaphore::new(max_connections));
        let tracker = TaskTracker::new();

        log::info!(
            "listening on {} (max {} connections)",
            self.local_addr()?,
            max_connections,
        );

        loop {
            let reserved = match self.config.admission {
                Admission::Wait => tokio::select! {
                    _ = shutdown.cancelled() => break,
                    permit = Arc::clone(&limiter).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                },
                Admission::Reject => None,
            };

            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        log::error!("failed to accept a connection: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            let Some(permit) = reserved.or_else(|| Arc::clone(&limiter).try_acquire_owned().ok())
            else {
                log::warn!("{peer}: rejected, {max_connections} connections already active");
                drop(stream);
                continue;
            };

            let config = Arc::clone(&self.config);
            tracker.spawn(handle_connection(stream, peer, config, permit));
        }

        tracker.close();
        log::info!(
            "stopped listening, waiting for {} active connections",
            tracker.len()
        );
        tracker.wait().await;
        Ok(())
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    permit: OwnedSemaphorePermit,
) {
    let exchange = serve_one(&mut stream, &config, permit);

    let result = match config.request_timeout {
        Some(limit) => match tokio::time::timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("{peer}: timed out after {limit:?}");
                return;
            }
        },
        None => exchange.await,
    };

    if let Err(e) = result {
        log::error!("{peer}: {e}");
    }
}

/// Handles a single exchange. The connection slot (`permit`) moves into the blocking task,
/// so that it stays taken until the search finishes, even if the exchange times out.
async fn serve_one(
    stream: &mut TcpStream,
    config: &Arc<ServerConfig>,
    permit: OwnedSemaphorePermit,
) -> Result<(), RequestError> {
    let request = protocol::read_frame(stream).await?;

    let config = Arc::clone(config);
    let (response, _permit) = tokio::task::spawn_blocking(move || {
        let response = handle_request(&config.graph, &request, config.step_limit);
        (response, permit)
    })
    .await?;

    protocol::write_frame(stream, &response).await?;
    stream.shutdown().await.map_err(protocol::Error::from)?;
    Ok(())
}

/// Answers a single request payload, returning the response payload.
///
/// This is the whole per-request pipeline: decode the request, obtain the network
/// from `source`, snap both positions onto it, search and encode the result.
/// Requests which can't be processed (malformed request, unusable map data)
/// are logged and answered with an empty payload.
pub fn handle_request(source: &GraphSource, payload: &str, step_limit: usize) -> String {
    match answer(source, payload, step_limit) {
        Ok(response) => response,
        Err(e) => {
            match e {
                RequestError::Protocol(_) => log::warn!("rejecting request: {e}"),
                _ => log::error!("failed to answer request: {e}"),
            }
            String::new()
        }
    }
}

fn answer(source: &GraphSource, payload: &str, step_limit: usize) -> Result<String, RequestError> {
    let request = RouteRequest::decode(payload)?;
    let index = source.index().map_err(RouteError::from)?;

    let response = match index.route(request.origin, request.destination, step_limit) {
        Ok(Some(route)) => {
            log::debug!(
                "route {} → {}: {} nodes, {:.3} km, {:.1} min",
                request.origin,
                request.destination,
                route.nodes.len(),
                route.distance_km(),
                route.travel_time_min(),
            );
            RouteResponse::from_route(&index, &route)
        }
        Ok(None) => {
            log::debug!("route {} → {}: no path", request.origin, request.destination);
            RouteResponse::no_route()
        }
        Err(RouteError::Search(e)) => {
            log::warn!("route {} → {}: {e}", request.origin, request.destination);
            RouteResponse::NotFound {
                reason: e.to_string(),
            }
        }
        Err(e) => return Err(e.into()),
    };

    let encoded = response.encode()?;
    if encoded.len() > MAX_FRAME_LEN {
        log::warn!(
            "route {} → {}: response of {} bytes doesn't fit in a frame",
            request.origin,
            request.destination,
            encoded.len(),
        );
        return Ok(RouteResponse::NotFound {
            reason: "route too long for a single response".to_string(),
        }
        .encode()?);
    }
    Ok(encoded)
}
