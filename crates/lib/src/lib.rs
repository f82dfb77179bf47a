//! chpack-lib: Core types and logic for chpack
//!
//! chpack builds native packages for several Linux distributions from one
//! project by building it inside a disposable chroot per platform:
//! - `descriptor`: the package description evaluated from `pkg.lua`
//! - `plan`: typed, serializable steps for every target platform
//! - `execute`: the plan interpreter and the host runner
//! - `dispatch`: validation, local or remote execution and cleanup

pub mod consts;
pub mod descriptor;
pub mod dispatch;
pub mod execute;
pub mod lua;
pub mod manifest;
pub mod mirror;
pub mod plan;
pub mod platform;
