// server.rs - TCP server for the control service

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::service::ControlService;
use crate::wire::{Envelope, MAX_FRAME_SIZE, Request, Response, read_frame, write_frame};

/// Serves the control protocol until the simulation is shut down.
pub struct RpcServer {
    config: ServerConfig,
    service: Arc<ControlService>,
    listener: TcpListener,
}

impl RpcServer {
    /// Bind the listening socket.
    pub async fn bind(config: ServerConfig, service: Arc<ControlService>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        Ok(Self { config, service, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the service reports a stopped run, then let
    /// in-flight replies flush (bounded by `shutdown_grace`) and return.
    pub async fn serve(self) -> Result<(), ServerError> {
        let RpcServer { config, service, listener } = self;
        info!(addr = %listener.local_addr()?, "Control service listening");

        let mut stopped = service.stopped();
        let mut connections = JoinSet::new();

        loop {
            if *stopped.borrow_and_update() {
                break;
            }
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "Controller connected");
                        connections.spawn(handle_connection(stream, peer, Arc::clone(&service)));
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                changed = stopped.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!("Simulation stopped, shutting down control service");
        drop(listener);

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(config.shutdown_grace, drain).await.is_err() {
            warn!(grace = ?config.shutdown_grace, "Connections still busy, dropping them");
            connections.abort_all();
        }
        Ok(())
    }
}

/// One controller connection. Requests are decoded by a reader task and each
/// handled on its own task, so a blocking `RunGame` does not hold up polls.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, service: Arc<ControlService>) {
    let (mut reader, writer) = stream.into_split();
    let (response_tx, response_rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_responses(writer, response_rx, peer));

    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<Envelope<Request>>();
    let reader_task = tokio::spawn(async move {
        loop {
            match read_frame::<_, Envelope<Request>>(&mut reader, MAX_FRAME_SIZE).await {
                Ok(Some(envelope)) => {
                    if request_tx.send(envelope).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(%peer, "Controller closed connection");
                    break;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "Dropping connection after bad frame");
                    break;
                }
            }
        }
    });

    let mut stopped: watch::Receiver<bool> = service.stopped();
    let mut in_flight = JoinSet::new();
    loop {
        if *stopped.borrow_and_update() {
            break;
        }
        tokio::select! {
            request = request_rx.recv() => {
                let Some(Envelope { id, body }) = request else {
                    break;
                };
                let service = Arc::clone(&service);
                let response_tx = response_tx.clone();
                in_flight.spawn(async move {
                    let op = body.name();
                    debug!(id, op, "Handling request");
                    let body = service.handle(body).await;
                    if let Response::Error(e) = &body {
                        debug!(id, op, error = %e, "Request failed");
                    }
                    let _ = response_tx.send(Envelope { id, body });
                });
            }
            changed = stopped.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    reader_task.abort();
    while in_flight.join_next().await.is_some() {}
    drop(response_tx);
    let _ = writer_task.await;
    debug!(%peer, "Connection finished");
}

async fn write_responses(
    mut writer: OwnedWriteHalf,
    mut responses: mpsc::UnboundedReceiver<Envelope<Response>>,
    peer: SocketAddr,
) {
    while let Some(envelope) = responses.recv().await {
        if let Err(e) = write_frame(&mut writer, &envelope).await {
            warn!(%peer, id = envelope.id, error = %e, "Failed to send response");
            break;
        }
    }
}
