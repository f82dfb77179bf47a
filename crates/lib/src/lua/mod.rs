//! Lua runtime and descriptor evaluation.
//!
//! This module provides the Lua execution environment for descriptor files.
//! It manages the Lua VM lifecycle, registers the directive functions and the
//! `chpack` helper table, and evaluates the descriptor into a
//! [`BuildDescriptor`].
//!
//! # Submodules
//!
//! - [`globals`] - The `chpack` global table
//! - [`runtime`] - Low-level Lua VM management

pub mod globals;
pub mod runtime;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, info};

use crate::descriptor::{BuildDescriptor, DescriptorBuilder, DescriptorError};

/// Evaluate a descriptor file and validate the result.
///
/// Directives apply in file order; the first rejected directive aborts
/// evaluation with its configuration error.
pub fn load_descriptor(path: &Path) -> Result<BuildDescriptor, DescriptorError> {
  info!(path = ?path, "evaluating descriptor");
  let builder = Rc::new(RefCell::new(DescriptorBuilder::new()));

  let eval_err = |e: mlua::Error| DescriptorError::Eval(format!("{}: {}", path.display(), e));
  let lua = runtime::create_runtime(builder.clone()).map_err(eval_err)?;
  runtime::load_file(&lua, path).map_err(eval_err)?;
  drop(lua);

  let descriptor = std::mem::take(&mut *builder.borrow_mut()).build()?;
  debug!(
    name = %descriptor.name,
    version = %descriptor.version,
    platforms = descriptor.platforms.len(),
    "descriptor loaded"
  );
  Ok(descriptor)
}
