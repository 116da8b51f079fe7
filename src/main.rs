//! ==============================================================================
//! main.rs - farm-link host entry point
//! ==============================================================================
//!
//! purpose:
//!     keeps one farm rig under watch and serves its live state to the
//!     dashboard screens.
//!
//! responsibilities:
//!     - load dashboard.toml (or defaults)
//!     - probe the controller and the camera every 10s
//!     - poll sensor data every 3s while the controller answers
//!     - serve the read-model as json on the view api
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    rust host (this file)                     │
//!     │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//!     │  │ prober      │  │ data poll   │  │ view api            │  │
//!     │  │ (10s cycle) │  │ (3s cycle)  │  │ (port 3000)         │  │
//!     │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘  │
//!     │         └────────────────┼────────────────────┘             │
//!     │                    ┌─────┴─────┐                            │
//!     │                    │ dashboard │ <- coordinator.rs          │
//!     │                    └─────┬─────┘                            │
//!     └──────────────────────────┼──────────────────────────────────┘
//!                                │ http
//!                    ┌───────────┴───────────┐
//!                    ▼                       ▼
//!             ┌─────────────┐         ┌─────────────┐
//!             │ controller  │         │ camera      │
//!             │ /status ... │         │ :81/stream  │
//!             └─────────────┘         └─────────────┘
//!
//! ==============================================================================

use anyhow::Result;
use farm_link::{server, Dashboard, DashboardConfig, HttpCamera, HttpController};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  farm-link - controller & camera watch");
    println!("===========================================================");

    // step 1: load configuration
    let config = DashboardConfig::load_or_default(std::env::args_os().nth(1).map(Into::into))?;
    config.print_summary();

    // step 2: logging (RUST_LOG wins over the config file)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // step 3: remote endpoints
    let controller = HttpController::new(&config.controller)?;
    let camera = HttpCamera::new(&config.camera)?;

    // step 4: start probing and polling
    let dashboard = Dashboard::start(&config, controller, camera);

    // step 5: serve the views until ctrl-c
    let bind = config.server.bind.clone();
    let handle = dashboard.handle();
    tokio::select! {
        res = server::run_server(&bind, handle) => {
            if let Err(e) = &res {
                tracing::error!("web server error: {:#}", e);
            }
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    dashboard.shutdown();
    Ok(())
}
