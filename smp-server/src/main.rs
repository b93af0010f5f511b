mod console;
mod dispatcher;

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use smp_protocol::{read_request, write_response};
use smp_storage::{Pool, DEFAULT_PAGE_BYTES, DEFAULT_POOL_BYTES};

#[derive(Parser)]
#[command(name = "smp-server", version, about = "Shared memory pool server")]
struct Cli {
    /// Address to listen for TCP clients on.
    #[arg(long, default_value = "127.0.0.1:7878")]
    listen: String,

    /// Snapshot file path, read on startup (if present) and written on
    /// graceful shutdown.
    #[arg(long, default_value = "memory_pool.dat")]
    snapshot: PathBuf,

    /// Skip restoring from the snapshot file on startup.
    #[arg(long)]
    no_restore: bool,

    /// Total pool capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_POOL_BYTES)]
    pool_bytes: usize,

    /// Page size in bytes.
    #[arg(long, default_value_t = DEFAULT_PAGE_BYTES)]
    page_bytes: usize,
}

/// Performs a final snapshot when dropped, so an unhandled process exit
/// (including an unrecognized console path returning from `main`) still
/// attempts to persist the pool, per the shutdown design note.
struct SnapshotGuard {
    pool: Arc<Pool>,
    path: PathBuf,
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        if let Err(e) = self.pool.snapshot(&self.path) {
            tracing::error!("final snapshot failed: {e}");
        } else {
            tracing::info!("final snapshot written to {}", self.path.display());
        }
    }
}

fn handle_connection(pool: Arc<Pool>, mut stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::info!("client connected: {peer}");

    loop {
        let (command, operand) = match read_request(&mut stream) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::debug!("client {peer} disconnected: {e}");
                break;
            }
        };
        let (code, payload) = dispatcher::dispatch(&pool, command, &operand);
        if let Err(e) = write_response(&mut stream, code, &payload) {
            tracing::debug!("client {peer} write failed: {e}");
            break;
        }
    }
    let _ = stream.flush();
    tracing::info!("client disconnected: {peer}");
}

fn run_accept_loop(pool: Arc<Pool>, listener: TcpListener) {
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let pool = Arc::clone(&pool);
                thread::spawn(move || handle_connection(pool, stream));
            }
            Err(e) => tracing::warn!("failed to accept connection: {e}"),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let pool = Arc::new(Pool::new(cli.pool_bytes, cli.page_bytes));

    if !cli.no_restore && cli.snapshot.exists() {
        match pool.restore(&cli.snapshot) {
            Ok(()) => tracing::info!("restored pool from {}", cli.snapshot.display()),
            Err(e) => tracing::warn!("failed to restore from {}: {e}", cli.snapshot.display()),
        }
    }

    let listener = match TcpListener::bind(&cli.listen) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {}: {e}", cli.listen);
            std::process::exit(1);
        }
    };
    tracing::info!("listening on {}", cli.listen);

    let guard = SnapshotGuard {
        pool: Arc::clone(&pool),
        path: cli.snapshot.clone(),
    };

    {
        let pool = Arc::clone(&pool);
        thread::spawn(move || run_accept_loop(pool, listener));
    }

    console::run(&pool, &cli.snapshot);

    drop(guard);
}
