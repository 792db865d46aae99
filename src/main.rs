//! hearth: run an application from a project root.
//!
//! # Architecture Overview
//!
//! ```text
//!   kernel::container(app, root, env)
//!        │
//!        ▼
//!   ┌───────────┐   boot()    ┌──────────────────────────────────────────┐
//!   │Application│────────────▶│ templates → models → http → socket → tasks│
//!   └─────┬─────┘             └──────────────────────────────────────────┘
//!         │ listen()
//!         ▼
//!   middleware → bind → serve ──┬── task supervisor (worker processes)
//!                               └── websocket acceptor
//!         │ SIGTERM / SIGINT
//!         ▼
//!   stop(): models → sockets → tasks → listener drain → exit code
//! ```

use std::path::PathBuf;

use clap::Parser;

use hearth::{kernel, launch};

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "Boot and serve a hearth application", long_about = None)]
struct Args {
    /// Project root containing `config/` and `apps/`
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Application directory under `apps/`
    #[arg(short, long, default_value = "main")]
    app: String,

    /// Environment name, selecting `config/<app>.<env>.yml`
    #[arg(short, long, env = "HEARTH_ENV", default_value = kernel::DEFAULT_ENV)]
    env: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let app = launch::application(&args.app, &args.root, &args.env, |_| {});
    let guard = launch::init_logging(app.container());

    tracing::info!(
        app = %args.app,
        env = %args.env,
        root = %args.root.display(),
        "hearth v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let code = launch::run(&app).await;

    drop(guard);
    std::process::exit(code);
}
