//! Bounded message queue in front of an [`UploadSession`].
//!
//! The transport pushes every inbound message through a
//!  [`SessionHandle`]; a single task drains the queue in arrival order
//!  and sends replies back over an outbound channel. Arrivals that find
//!  the queue full are answered with `TOO_MANY_REQUESTS` and dropped.
//!
//! The reply channel is bounded too. A transport that stops reading
//!  stalls the session, and refusals that find no room are discarded.

use tokio::task::JoinHandle;

use super::messages::{Inbound, Outbound, Reply, ReplyKind};
use super::session::{SessionContext, SessionState, UploadSession};
use crate::reason::ErrorCode;
use crate::store::MetadataStore;

/// Messages a session may have waiting before new arrivals are refused
pub const SESSION_QUEUE_CAPACITY: usize = 10;

/// Replies that may wait for the transport before the session stalls
pub const REPLY_QUEUE_CAPACITY: usize = 2 * SESSION_QUEUE_CAPACITY;

/// Transport-side handle onto a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inbound: flume::Sender<Inbound>,
    outbound: flume::Sender<Outbound>,
}

impl SessionHandle {
    /// Queue a message for the session. Returns `false` once the session
    ///  has ended and will not take any more messages.
    pub fn push(&self, message: Inbound) -> bool {
        match self.inbound.try_send(message) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(_)) => {
                tracing::debug!("upload session queue full, refusing message");
                let reply = Reply::reject(ReplyKind::Any, ErrorCode::TooManyRequests);
                match self.outbound.try_send(Outbound::Reply(reply)) {
                    Ok(()) | Err(flume::TrySendError::Full(_)) => true,
                    Err(flume::TrySendError::Disconnected(_)) => false,
                }
            }
            Err(flume::TrySendError::Disconnected(_)) => false,
        }
    }

    /// Tell the session its transport went away. Never refused for a full
    ///  queue, so the session always learns about it.
    pub async fn close(&self) {
        let _ = self.inbound.send_async(Inbound::Close).await;
    }
}

/// Start a session on its own task.
///
/// Returns the handle to feed it, the receiver for its replies and the
///  task, which resolves to the state the session ended in.
pub fn spawn_session<S: MetadataStore>(
    ctx: SessionContext<S>,
) -> (
    SessionHandle,
    flume::Receiver<Outbound>,
    JoinHandle<SessionState>,
) {
    let (inbound_tx, inbound_rx) = flume::bounded(SESSION_QUEUE_CAPACITY);
    let (outbound_tx, outbound_rx) = flume::bounded(REPLY_QUEUE_CAPACITY);
    let handle = SessionHandle {
        inbound: inbound_tx,
        outbound: outbound_tx.clone(),
    };
    let task = tokio::spawn(run_session(UploadSession::new(ctx), inbound_rx, outbound_tx));
    (handle, outbound_rx, task)
}

/// Drain `inbound` into `session` until the transport closes, the reply
///  side goes away or the session sits idle for its timeout. A reply the
///  transport does not take within the timeout also ends the session.
pub async fn run_session<S: MetadataStore>(
    mut session: UploadSession<S>,
    inbound: flume::Receiver<Inbound>,
    outbound: flume::Sender<Outbound>,
) -> SessionState {
    let idle = session.idle_timeout();
    loop {
        let message = match tokio::time::timeout(idle, inbound.recv_async()).await {
            Ok(Ok(message)) => message,
            // every handle dropped without saying goodbye
            Ok(Err(_)) => {
                session.shutdown(SessionState::Aborted).await;
                break;
            }
            Err(_) => {
                tracing::debug!(account = ?session.account(), "upload session idle, closing");
                session.shutdown(SessionState::Aborted).await;
                let _ = tokio::time::timeout(idle, outbound.send_async(Outbound::Close)).await;
                break;
            }
        };

        if let Some(reply) = session.handle(message).await {
            let sent = tokio::time::timeout(idle, outbound.send_async(Outbound::Reply(reply)))
                .await;
            if !matches!(sent, Ok(Ok(()))) {
                tracing::debug!(account = ?session.account(), "upload replies not taken, closing");
                session.shutdown(SessionState::Aborted).await;
                break;
            }
        }
        if matches!(
            session.state(),
            SessionState::Closed | SessionState::Aborted
        ) {
            break;
        }
    }
    session.state()
}
