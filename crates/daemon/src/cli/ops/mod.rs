pub mod daemon;
pub mod init;
pub mod reconcile;
pub mod version;

pub use daemon::Daemon;
pub use init::Init;
pub use reconcile::Reconcile;
pub use version::Version;
