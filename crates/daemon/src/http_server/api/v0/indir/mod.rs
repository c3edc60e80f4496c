pub mod cp;
pub mod download;
pub mod file;
pub mod mimetype;
pub mod mkdir;
pub mod mv;
pub mod program;
pub mod readdir;
pub mod remove;
pub mod stat;
