/// Application name, used for default directories and remote work paths.
pub const APP_NAME: &str = "chpack";

/// Descriptor file evaluated when `--file` is not given.
pub const DESCRIPTOR_FILENAME: &str = "pkg.lua";

/// Generated plan file, written to the project root.
pub const PLAN_FILENAME: &str = ".chpack-plan.json";

/// Default build output directory, relative to the project root.
pub const OUTPUT_DIRNAME: &str = "pkg";

/// Where the project source is copied inside an environment root.
///
/// Kept at the top level so it never overlaps a declared package directory
/// like `usr` or `opt`.
pub const ENV_SOURCE_DIR: &str = "chpack-src";

/// Scratch directory inside an environment root for the package assembler.
pub const ENV_WORK_DIR: &str = "chpack-work";

/// Directories never copied into an environment or shipped to a remote host.
pub const PROJECT_EXCLUSIONS: &[&str] = &[".git", ".hg", ".svn", PLAN_FILENAME];
