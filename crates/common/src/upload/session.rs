use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use filetime::FileTime;
use serde_json::{Map, Value};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::messages::{ControlMessage, Inbound, Reply, ReplyKind};
use crate::account::AccountId;
use crate::auth::{AccessTokenVerifier, RequestLedger};
use crate::links::PublicLinkIndex;
use crate::quota::QuotaLedger;
use crate::reason::ErrorCode;
use crate::sandbox::{PathSandbox, DEFAULT_PROGRAM};
use crate::store::MetadataStore;

/// Idle period after which a session closes itself
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything a session needs from the outside world. Cheap to clone,
///  one per connection.
#[derive(Clone)]
pub struct SessionContext<S: MetadataStore> {
    pub sandbox: Arc<PathSandbox>,
    pub quota: QuotaLedger<S>,
    pub links: PublicLinkIndex<S>,
    pub verifier: Arc<dyn AccessTokenVerifier>,
    pub requests: Arc<dyn RequestLedger>,
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No account bound yet
    Idle,
    AwaitingOption,
    Streaming,
    /// Ended by the client
    Closed,
    /// Ended by idle timeout or a transport fault
    Aborted,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("rejected with {0}")]
    Rejected(ErrorCode),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<ErrorCode> for SessionError {
    fn from(code: ErrorCode) -> Self {
        SessionError::Rejected(code)
    }
}

/// A validated `option` message
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOption {
    pub program: String,
    pub path: PathBuf,
    pub mtime_ms: f64,
    pub birthtime_ms: f64,
    pub size: u64,
    pub to_public: bool,
}

/// The open destination file and its accounting
#[derive(Debug)]
struct Sink {
    file: File,
    account: AccountId,
    path: PathBuf,
    declared: u64,
    received: u64,
    /// Size of the file this upload replaces, released on finalize
    replaced: u64,
    accessed: FileTime,
    modified: FileTime,
}

/// Per-connection upload state machine.
///
/// Messages go through [`UploadSession::handle`] strictly one at a time,
///  fed by the queue in [`crate::upload::spawn_session`]. The sink is
///  finalized at most once, on whichever exit path gets there first.
pub struct UploadSession<S: MetadataStore> {
    ctx: SessionContext<S>,
    account: Option<AccountId>,
    sink: Option<Sink>,
    ended: Option<SessionState>,
}

impl<S: MetadataStore> UploadSession<S> {
    pub fn new(ctx: SessionContext<S>) -> Self {
        Self {
            ctx,
            account: None,
            sink: None,
            ended: None,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.ctx.idle_timeout
    }

    pub fn account(&self) -> Option<&AccountId> {
        self.account.as_ref()
    }

    pub fn state(&self) -> SessionState {
        match (self.ended, &self.sink, &self.account) {
            (Some(ended), _, _) => ended,
            (None, Some(_), _) => SessionState::Streaming,
            (None, None, Some(_)) => SessionState::AwaitingOption,
            (None, None, None) => SessionState::Idle,
        }
    }

    /// Bytes accepted into the current sink
    pub fn received(&self) -> Option<u64> {
        self.sink.as_ref().map(|sink| sink.received)
    }

    pub async fn handle(&mut self, message: Inbound) -> Option<Reply> {
        if self.ended.is_some() {
            return None;
        }
        match message {
            Inbound::Text(text) => match ControlMessage::parse(&text)? {
                ControlMessage::Token { data } => Some(self.on_token(data).await),
                ControlMessage::Option { data } => Some(self.on_option(data).await),
                ControlMessage::Close => {
                    self.finalize_sink().await;
                    None
                }
            },
            Inbound::Binary(frame) => Some(self.on_frame(frame).await),
            Inbound::Close => {
                self.shutdown(SessionState::Closed).await;
                None
            }
        }
    }

    /// End the session, finalizing any open sink. Later calls are no-ops.
    pub async fn shutdown(&mut self, end: SessionState) {
        if self.ended.is_some() {
            return;
        }
        self.finalize_sink().await;
        self.ended = Some(end);
        tracing::debug!(state = ?end, "upload session ended");
    }

    async fn on_token(&mut self, data: Value) -> Reply {
        let credential = match data {
            Value::String(credential) if !credential.is_empty() => credential,
            _ => return Reply::reject(ReplyKind::Token, ErrorCode::UnavailableData),
        };
        let Some(account) = self.ctx.verifier.verify(&credential).await else {
            return Reply::reject(ReplyKind::Token, ErrorCode::UnavailableToken);
        };
        if !self.ctx.requests.admit(&account, 1).await {
            return Reply::reject(ReplyKind::Token, ErrorCode::TooManyRequests);
        }

        tracing::debug!(account = %account, "upload session bound");
        self.account = Some(account);
        Reply::ok(ReplyKind::Token)
    }

    async fn on_option(&mut self, data: Value) -> Reply {
        let Value::Object(fields) = data else {
            return Reply::reject(ReplyKind::Option, ErrorCode::UnavailableData);
        };
        let Some(account) = self.account.clone() else {
            return Reply::reject(ReplyKind::Option, ErrorCode::UnavailableToken);
        };

        match self.open_upload(&account, &fields).await {
            Ok(reply) => reply,
            Err(SessionError::Rejected(code)) => Reply::reject(ReplyKind::Option, code),
            Err(SessionError::Io(e)) => {
                tracing::warn!(account = %account, error = %e, "failed to open upload");
                Reply::reject(ReplyKind::Any, ErrorCode::UnknownError)
            }
        }
    }

    async fn open_upload(
        &mut self,
        account: &AccountId,
        fields: &Map<String, Value>,
    ) -> Result<Reply, SessionError> {
        let option = self.validate_option(account, fields)?;

        self.finalize_sink().await;

        let replaced = match tokio::fs::metadata(&option.path).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            Ok(_) => return Err(ErrorCode::UnavailablePath.into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        if !self.ctx.quota.admits_replacing(account, option.size, replaced).await {
            return Err(ErrorCode::TooBigSize.into());
        }

        let file = File::create(&option.path).await?;
        tracing::info!(
            account = %account,
            path = ?option.path,
            size = option.size,
            replaced,
            "upload opened"
        );
        self.sink = Some(Sink {
            file,
            account: account.clone(),
            path: option.path.clone(),
            declared: option.size,
            received: 0,
            replaced,
            accessed: file_time(option.birthtime_ms),
            modified: file_time(option.mtime_ms),
        });

        if !option.to_public {
            return Ok(Reply::ok(ReplyKind::Option));
        }
        match self.ctx.links.create(account, &option.path).await {
            Ok(nid) => Ok(Reply::shared(nid)),
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "failed to share upload");
                Ok(Reply::ok(ReplyKind::Option))
            }
        }
    }

    fn validate_option(
        &self,
        account: &AccountId,
        fields: &Map<String, Value>,
    ) -> Result<UploadOption, ErrorCode> {
        let sandbox = &self.ctx.sandbox;

        let program = match fields.get("program") {
            None | Some(Value::Null) => DEFAULT_PROGRAM,
            Some(Value::String(program)) if program.is_empty() => DEFAULT_PROGRAM,
            Some(Value::String(program)) => program.as_str(),
            Some(_) => return Err(ErrorCode::UnavailableProgram),
        };
        if !sandbox.validate_program_name(program) {
            return Err(ErrorCode::UnavailableProgram);
        }

        let Some(dir) = fields.get("dir").and_then(Value::as_str) else {
            return Err(ErrorCode::UnavailableDirectory);
        };
        let dir = sandbox.resolve(account, program, dir);
        if !sandbox.validate_directory(account, program, &dir) {
            return Err(ErrorCode::UnavailableDirectory);
        }

        let name = fields
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| sandbox.validate_indir_name(name))
            .ok_or(ErrorCode::UnavailableName)?;
        let path = dir.join(name);
        if !sandbox.validate_path(account, program, &path) {
            return Err(ErrorCode::UnavailablePath);
        }

        let mtime_ms = timestamp(fields.get("mtimeMs")).ok_or(ErrorCode::UnavailableMtimems)?;
        let birthtime_ms =
            timestamp(fields.get("birthtimeMs")).ok_or(ErrorCode::UnavailableBirthtimems)?;
        let size = fields
            .get("size")
            .and_then(Value::as_u64)
            .ok_or(ErrorCode::UnavailableSize)?;
        // older clients spell it toPubilc
        let to_public = fields
            .get("toPublic")
            .or_else(|| fields.get("toPubilc"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(UploadOption {
            program: program.to_string(),
            path,
            mtime_ms,
            birthtime_ms,
            size,
            to_public,
        })
    }

    async fn on_frame(&mut self, frame: Bytes) -> Reply {
        if self.account.is_none() {
            return Reply::reject(ReplyKind::Raw, ErrorCode::UnavailableToken);
        }
        let Some(sink) = self.sink.as_mut() else {
            return Reply::reject(ReplyKind::Raw, ErrorCode::StreamNotOpened);
        };

        let len = frame.len() as u64;
        if sink.received.saturating_add(len) > sink.declared {
            return Reply::reject(ReplyKind::Raw, ErrorCode::SendExceeded);
        }
        if !self
            .ctx
            .quota
            .admits_replacing(&sink.account, len, sink.replaced)
            .await
        {
            return Reply::reject(ReplyKind::Raw, ErrorCode::CapacityFull);
        }

        self.ctx.quota.change_capacity(&sink.account, len as i64).await;
        // flush so a failed write surfaces on the frame that caused it
        let written = match sink.file.write_all(&frame).await {
            Ok(()) => sink.file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::warn!(account = %sink.account, path = ?sink.path, error = %e, "upload write failed");
            self.abort_sink(len).await;
            return Reply::reject(ReplyKind::Any, ErrorCode::UnknownError);
        }

        sink.received += len;
        Reply::uploaded(sink.received)
    }

    /// Close the sink, release the replaced file's bytes and put the
    ///  client's timestamps on the result.
    async fn finalize_sink(&mut self) {
        let Some(mut sink) = self.sink.take() else {
            return;
        };
        if let Err(e) = sink.file.flush().await {
            tracing::warn!(path = ?sink.path, error = %e, "failed to flush upload");
        }
        drop(sink.file);

        self.ctx
            .quota
            .change_capacity(&sink.account, -(sink.replaced as i64))
            .await;

        let path = sink.path.clone();
        let (accessed, modified) = (sink.accessed, sink.modified);
        match tokio::task::spawn_blocking(move || filetime::set_file_times(&path, accessed, modified))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(path = ?sink.path, error = %e, "failed to restore upload timestamps")
            }
            Err(e) => {
                tracing::warn!(path = ?sink.path, error = %e, "timestamp restore task failed")
            }
        }

        tracing::info!(
            account = %sink.account,
            path = ?sink.path,
            bytes = sink.received,
            declared = sink.declared,
            "upload finalized"
        );
    }

    /// Drop the sink after a write failure, undoing the failed frame's
    ///  charge and releasing the replaced file's bytes.
    async fn abort_sink(&mut self, failed_frame: u64) {
        let Some(sink) = self.sink.take() else {
            return;
        };
        let released = sink.replaced.saturating_add(failed_frame) as i64;
        self.ctx.quota.change_capacity(&sink.account, -released).await;
        tracing::warn!(
            account = %sink.account,
            path = ?sink.path,
            bytes = sink.received,
            "upload aborted"
        );
    }
}

fn timestamp(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|ms| ms.is_finite())
}

fn file_time(ms: f64) -> FileTime {
    let secs = (ms / 1000.0).floor();
    let nanos = ((ms - secs * 1000.0) * 1_000_000.0) as u32;
    FileTime::from_unix_time(secs as i64, nanos.min(999_999_999))
}
