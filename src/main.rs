// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::error::Error;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use quadroute::protocol::{self, RouteRequest, RouteResponse};
use quadroute::server::{self, Admission, Server, ServerConfig};
use quadroute::{map, Coordinate, GraphSource, RoutingIndex, DEFAULT_STEP_LIMIT};

#[derive(Debug, thiserror::Error)]
#[error("{0}: {1}")]
struct MapLoadError(PathBuf, #[source] map::Error);

#[derive(Parser)]
#[command(version, about = "Point-to-point road routing over GeoJSON map data")]
struct Cli {
    /// Log debug messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer routing requests over TCP until interrupted
    Serve(ServeArgs),

    /// Find a single route and print it as GeoJSON
    Route(RouteArgs),

    /// Send a single request to a running server and print the response
    Query(QueryArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// The path to the GeoJSON map file (optionally gzip or bzip2 compressed)
    #[arg(long, env = "QUADROUTE_MAP", default_value = "mapData.json")]
    map: PathBuf,

    #[arg(long, env = "QUADROUTE_PORT", default_value_t = server::DEFAULT_PORT)]
    port: u16,

    #[arg(long, env = "QUADROUTE_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Load the map once on startup, instead of on every request
    #[arg(long, env = "QUADROUTE_PRELOAD")]
    preload: bool,

    /// Maximum number of concurrently handled connections
    #[arg(long, env = "QUADROUTE_MAX_CONNECTIONS", default_value_t = server::DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Close excess connections, instead of waiting for a free slot
    #[arg(long, env = "QUADROUTE_REJECT_WHEN_BUSY")]
    reject_when_busy: bool,

    /// Maximum time to handle a single connection
    #[arg(long, env = "QUADROUTE_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Default speed (km/h) for roads without "maxspeed"
    #[arg(long, env = "QUADROUTE_DEFAULT_MAX_SPEED")]
    default_max_speed: Option<f64>,

    /// Maximum number of nodes expanded by a single search
    #[arg(long, env = "QUADROUTE_STEP_LIMIT", default_value_t = DEFAULT_STEP_LIMIT)]
    step_limit: usize,
}

#[derive(Args)]
struct RouteArgs {
    /// The path to the GeoJSON map file
    map: PathBuf,

    /// Latitude of the start point
    start_lat: f64,

    /// Longitude of the start point
    start_lon: f64,

    /// Latitude of the end point
    end_lat: f64,

    /// Longitude of the end point
    end_lon: f64,

    /// Default speed (km/h) for roads without "maxspeed"
    #[arg(long)]
    default_max_speed: Option<f64>,
}

#[derive(Args)]
struct QueryArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = server::DEFAULT_PORT)]
    port: u16,

    start_lat: f64,
    start_lon: f64,
    end_lat: f64,
    end_lon: f64,
}

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    colog::default_builder().filter_level(level).init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Route(args) => route(args),
        Command::Query(args) => query(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error>> {
    let options = map::Options {
        default_max_speed: args.default_max_speed,
        ..map::Options::default()
    };

    let graph = if args.preload {
        GraphSource::preload(&args.map, &options).map_err(|e| MapLoadError(args.map.clone(), e))?
    } else {
        GraphSource::PerRequest {
            path: args.map,
            options,
        }
    };

    let config = ServerConfig {
        bind: SocketAddr::new(args.bind, args.port),
        graph,
        max_connections: args.max_connections,
        admission: if args.reject_when_busy {
            Admission::Reject
        } else {
            Admission::Wait
        },
        request_timeout: args.timeout_secs.map(Duration::from_secs),
        step_limit: args.step_limit,
    };

    let server = Server::bind(config).await?;
    let shutdown = CancellationToken::new();

    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("interrupted, shutting down"),
            Err(e) => log::error!("failed to listen for Ctrl-C: {e}"),
        }
        on_signal.cancel();
    });

    server.run(shutdown).await?;
    Ok(())
}

fn route(args: RouteArgs) -> Result<(), Box<dyn Error>> {
    let options = map::Options {
        default_max_speed: args.default_max_speed,
        ..map::Options::default()
    };
    let index = RoutingIndex::load(&args.map, &options).map_err(|e| MapLoadError(args.map, e))?;

    let origin = Coordinate::new(args.start_lat, args.start_lon);
    let destination = Coordinate::new(args.end_lat, args.end_lon);
    let response = match index.route(origin, destination, DEFAULT_STEP_LIMIT)? {
        Some(route) => RouteResponse::from_route(&index, &route),
        None => RouteResponse::no_route(),
    };

    println!("{}", response.encode()?);
    Ok(())
}

async fn query(args: QueryArgs) -> Result<(), Box<dyn Error>> {
    let request = RouteRequest {
        origin: Coordinate::new(args.start_lat, args.start_lon),
        destination: Coordinate::new(args.end_lat, args.end_lon),
    };

    let mut stream = TcpStream::connect((args.host.as_str(), args.port)).await?;
    let response = protocol::exchange(&mut stream, &request.encode()?).await?;

    if response.is_empty() {
        return Err("server returned an empty response".into());
    }
    println!("{response}");
    Ok(())
}
