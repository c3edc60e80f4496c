pub mod account;
/**
 * Credential verification and per-account request
 *  counting, as seen by the core.
 */
pub mod auth;
/**
 * Opaque-token links into an account's tree, kept
 *  in step with deletes and renames of their targets.
 */
pub mod links;
/**
 * Per-account byte accounting with startup
 *  reconciliation against the filesystem.
 */
pub mod quota;
pub mod reason;
/**
 * Validation and normalization of client-supplied
 *  paths, confining them to an account's program root.
 */
pub mod sandbox;
/**
 * Row storage behind the ledger, the link index
 *  and registration, plus an in-memory implementation.
 */
pub mod store;
/**
 * Streaming upload session engine and the bounded
 *  queue that drives it.
 */
pub mod upload;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::account::AccountId;
    pub use crate::auth::{AccessTokenVerifier, RequestLedger, StaticTokenVerifier};
    pub use crate::links::{LinkError, PublicLink, PublicLinkIndex};
    pub use crate::quota::QuotaLedger;
    pub use crate::reason::ErrorCode;
    pub use crate::sandbox::{PathSandbox, SandboxLimits, DEFAULT_PROGRAM};
    pub use crate::store::{MetadataStore, StoreError};
    pub use crate::upload::{SessionContext, UploadSession};
    pub use crate::version::build_info;
}
