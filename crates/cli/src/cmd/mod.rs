mod build;
mod exec_plan;
mod platforms;

pub use build::cmd_build;
pub use exec_plan::cmd_exec_plan;
pub use platforms::cmd_platforms;
