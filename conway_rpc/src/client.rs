// client.rs - Client side of the control protocol
//
// One TCP connection carries every call. A reader task routes responses back
// to their callers by id, so `run_game` can block for the whole simulation
// while other clones of the client keep polling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use conway::RunState;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::wire::{
    AliveCountResponse, BoardResponse, ChangeStateResponse, Envelope, GameRequest, GameResponse,
    MAX_FRAME_SIZE, Request, Response, read_frame, write_frame,
};

/// Outstanding calls by id. `None` once the connection is gone.
type Pending = Option<HashMap<u64, oneshot::Sender<Response>>>;

struct ClientInner {
    next_id: AtomicU64,
    pending: Mutex<Pending>,
    outbound: mpsc::UnboundedSender<Envelope<Request>>,
}

impl ClientInner {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheap to clone; all clones share the connection.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
    request_timeout: Option<Duration>,
}

impl RpcClient {
    pub async fn connect<A: ToSocketAddrs + std::fmt::Display>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(&addr).await.map_err(|source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        stream.set_nodelay(true).ok();
        let (mut reader, mut writer) = stream.into_split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Envelope<Request>>();
        let inner = Arc::new(ClientInner {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(Some(HashMap::new())),
            outbound,
        });

        tokio::spawn(async move {
            while let Some(envelope) = outbound_rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &envelope).await {
                    warn!(id = envelope.id, error = %e, "Failed to send request");
                    break;
                }
            }
        });

        let routes = Arc::clone(&inner);
        tokio::spawn(async move {
            loop {
                match read_frame::<_, Envelope<Response>>(&mut reader, MAX_FRAME_SIZE).await {
                    Ok(Some(Envelope { id, body })) => {
                        let waiter = routes.pending().as_mut().and_then(|p| p.remove(&id));
                        match waiter {
                            Some(waiter) => {
                                let _ = waiter.send(body);
                            }
                            None => debug!(id, "Response for a call nobody is waiting on"),
                        }
                    }
                    Ok(None) => {
                        debug!("Server closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Control connection failed");
                        break;
                    }
                }
            }
            // Dropping the senders wakes every waiter with `ConnectionClosed`.
            routes.pending().take();
        });

        Ok(Self { inner, request_timeout: None })
    }

    /// Bound every call except `run_game` by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    async fn call(&self, request: Request, timeout: Option<Duration>) -> Result<Response, ClientError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        match self.inner.pending().as_mut() {
            Some(pending) => {
                pending.insert(id, tx);
            }
            None => return Err(ClientError::ConnectionClosed),
        }

        if self.inner.outbound.send(Envelope { id, body: request }).is_err() {
            self.forget(id);
            return Err(ClientError::ConnectionClosed);
        }

        let response = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(response) => response,
                Err(_) => {
                    self.forget(id);
                    return Err(ClientError::Timeout(limit));
                }
            },
            None => rx.await,
        };

        match response.map_err(|_| ClientError::ConnectionClosed)? {
            Response::Error(e) => Err(ClientError::Remote(e)),
            other => Ok(other),
        }
    }

    fn forget(&self, id: u64) {
        if let Some(pending) = self.inner.pending().as_mut() {
            pending.remove(&id);
        }
    }

    /// Run a whole simulation. Blocks until it completes or is stopped.
    pub async fn run_game(&self, request: GameRequest) -> Result<GameResponse, ClientError> {
        match self.call(Request::RunGame(request), None).await? {
            Response::Game(game) => Ok(game),
            _ => Err(ClientError::UnexpectedResponse("RunGame")),
        }
    }

    pub async fn alive_count(&self) -> Result<AliveCountResponse, ClientError> {
        match self.call(Request::GetAliveCount, self.request_timeout).await? {
            Response::AliveCount(count) => Ok(count),
            _ => Err(ClientError::UnexpectedResponse("GetAliveCount")),
        }
    }

    pub async fn board(&self) -> Result<BoardResponse, ClientError> {
        match self.call(Request::GetBoard, self.request_timeout).await? {
            Response::Board(board) => Ok(board),
            _ => Err(ClientError::UnexpectedResponse("GetBoard")),
        }
    }

    pub async fn change_state(&self, state: RunState) -> Result<ChangeStateResponse, ClientError> {
        match self.call(Request::ChangeState { state }, self.request_timeout).await? {
            Response::StateChanged(changed) => Ok(changed),
            _ => Err(ClientError::UnexpectedResponse("ChangeState")),
        }
    }

    pub async fn shut_down(&self) -> Result<(), ClientError> {
        match self.call(Request::ShutDown, self.request_timeout).await? {
            Response::ShutDownAck => Ok(()),
            _ => Err(ClientError::UnexpectedResponse("ShutDown")),
        }
    }
}
