use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use http::HeaderMap;
use serde::Deserialize;

use common::account::AccountId;
use common::reason::ErrorCode;
use common::sandbox::{is_under, join_lexical, paths_match, DEFAULT_PROGRAM};

use super::auth::authorize;
use super::ApiError;
use crate::ServiceState;

/// Query shared by the read endpoints: either an account path, or a
///  public link plus an optional fragment below it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocateQuery {
    pub path: Option<String>,
    pub program: Option<String>,
    pub nid: Option<String>,
}

/// Program name from a request, falling back to the default program
pub fn program_or_default(program: Option<&str>) -> &str {
    match program {
        Some(program) if !program.is_empty() => program,
        _ => DEFAULT_PROGRAM,
    }
}

/// Validated absolute path for `fragment` inside `account`'s `program`
pub fn account_path(
    state: &ServiceState,
    account: &AccountId,
    program: &str,
    fragment: Option<&str>,
) -> Result<PathBuf, ApiError> {
    let sandbox = state.sandbox();
    if !sandbox.validate_program_name(program) {
        return Err(ErrorCode::UnavailableProgram.into());
    }
    let fragment = fragment.ok_or(ErrorCode::UnavailablePath)?;
    let path = sandbox.resolve(account, program, fragment);
    if !sandbox.validate_path(account, program, &path) {
        return Err(ErrorCode::UnavailablePath.into());
    }
    Ok(path)
}

/// Like [`account_path`], but the program root itself is refused
pub fn entry_path(
    state: &ServiceState,
    account: &AccountId,
    program: &str,
    fragment: Option<&str>,
) -> Result<PathBuf, ApiError> {
    let path = account_path(state, account, program, fragment)?;
    let root = state.sandbox().program_root(account, program);
    if paths_match(&path.to_string_lossy(), &root.to_string_lossy()) {
        return Err(ErrorCode::UnavailablePath.into());
    }
    Ok(path)
}

/// Resolve the target of a read request.
///
/// With a `nid` the request is public: the link target is looked up
///  and the optional `path` is joined below it, never above. Without
///  one the caller must be a registered account. An unknown `nid` is
///  reported as `unknown_nid`.
pub async fn locate(
    state: &ServiceState,
    headers: &HeaderMap,
    query: &LocateQuery,
    unknown_nid: ErrorCode,
) -> Result<PathBuf, ApiError> {
    if let Some(nid) = query.nid.as_deref() {
        if nid.is_empty() {
            return Err(ErrorCode::UnavailableNid.into());
        }
        let target = state.links().resolve(nid).await.ok_or(unknown_nid)?;
        let Some(fragment) = query.path.as_deref() else {
            return Ok(target);
        };
        let path = join_lexical(&target, fragment);
        if !is_under(&path.to_string_lossy(), &target.to_string_lossy()) {
            return Err(ErrorCode::UnavailablePath.into());
        }
        return Ok(path);
    }

    let account = authorize(state, headers).await?;
    let program = program_or_default(query.program.as_deref());
    account_path(state, &account, program, query.path.as_deref())
}

/// Milliseconds since the epoch, 0 for times before it
pub fn millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Modification and creation time in milliseconds. Filesystems without
///  a creation time report the modification time for both.
pub fn times(meta: &std::fs::Metadata) -> (u64, u64) {
    let modified = meta.modified().map(millis).unwrap_or(0);
    let created = meta.created().map(millis).unwrap_or(modified);
    (modified, created)
}

/// `NotFound` becomes `NOT_EXISTS`, anything else stays an I/O error
pub async fn metadata(path: &Path) -> Result<std::fs::Metadata, ApiError> {
    tokio::fs::metadata(path).await.map_err(not_found_as_missing)
}

pub fn not_found_as_missing(e: std::io::Error) -> ApiError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ApiError::Rejected(ErrorCode::NotExists)
    } else {
        ApiError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_default() {
        assert_eq!(program_or_default(None), "cloud");
        assert_eq!(program_or_default(Some("")), "cloud");
        assert_eq!(program_or_default(Some("photos")), "photos");
    }

    #[test]
    fn test_millis_before_epoch() {
        assert_eq!(millis(UNIX_EPOCH), 0);
        assert_eq!(
            millis(UNIX_EPOCH + std::time::Duration::from_millis(1_234)),
            1_234
        );
    }
}
