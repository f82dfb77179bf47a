//! Leaf step implementations used by [`crate::execute::HostRunner`].

pub mod archive;
pub mod cmd;
pub mod fetch;
pub mod fs;
pub mod tool;

pub use cmd::{execute_chroot, execute_command, execute_script};
pub use fetch::execute_fetch_mirror;
