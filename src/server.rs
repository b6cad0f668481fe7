use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::{signal, task};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::EnvFilter;

use crate::codec::NulCodec;
use crate::config::Config;
use crate::connection::Connection;
use crate::executor::Executor;
use crate::response::Response;
use crate::store::Store;
use crate::Error;

/// Installs the global fmt subscriber, filtered by `RUST_LOG` (default `info`). Does nothing if a
/// subscriber is already installed.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));
}

pub async fn run(config: Config) -> Result<(), Error> {
    init_tracing();

    // The schema must exist before the first connection is accepted. A failure here is fatal.
    let store = Store::new(&config.database, config.busy_timeout);
    store.bootstrap()?;

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;

    info!("SQL server listening on {}", listener.local_addr()?);

    serve(
        listener,
        Executor::new(store),
        config.max_frame_size,
        async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        },
    )
    .await
}

/// Accepts connections until `shutdown` completes, running one task per connection.
///
/// Returning stops the accept loop only; handlers already spawned keep serving their clients until
/// they disconnect or the runtime shuts down.
pub async fn serve(
    listener: TcpListener,
    executor: Executor,
    max_frame_size: usize,
    shutdown: impl Future,
) -> Result<(), Error> {
    tokio::pin!(shutdown);

    loop {
        let (socket, client_address) = tokio::select! {
            res = listener.accept() => res?,
            _ = &mut shutdown => {
                info!("Shutting down, no longer accepting connections");
                return Ok(());
            }
        };

        let executor = executor.clone();
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, client_address, executor, max_frame_size).await
            {
                warn!("Connection terminated: {}", e);
            }
        });
    }
}

#[instrument(
    name = "connection",
    skip(stream, executor, max_frame_size),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    executor: Executor,
    max_frame_size: usize,
) -> Result<(), Error> {
    let mut conn = Connection::with_codec(stream, NulCodec::with_max_frame_size(max_frame_size));

    tracing::Span::current()
        .record("connection_id", conn.id.to_string())
        .record("client_address", client_address.to_string());

    // Commands on one connection run strictly one after another: the next frame is not read until
    // the previous response has been written.
    while let Some(command) = conn.read_frame().await? {
        debug!(kind = %command.kind(), "Received command from client");

        let executor = executor.clone();
        let response = task::spawn_blocking(move || executor.execute(&command))
            .await
            .unwrap_or_else(|e| Response::Failure(e.to_string()));

        debug!(success = response.is_success(), "Sending response to client");

        conn.write_frame(response).await?;
    }

    info!("Connection closed");
    Ok(())
}
