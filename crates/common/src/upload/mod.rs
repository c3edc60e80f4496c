mod driver;
mod messages;
mod session;

pub use driver::{
    run_session, spawn_session, SessionHandle, REPLY_QUEUE_CAPACITY, SESSION_QUEUE_CAPACITY,
};
pub use messages::{Inbound, Outbound, Reply, ReplyKind};
pub use session::{
    SessionContext, SessionError, SessionState, UploadOption, UploadSession, DEFAULT_IDLE_TIMEOUT,
};
