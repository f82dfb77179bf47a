use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;

use crate::descriptor::DescriptorBuilder;
use crate::lua::globals;

/// Create a new Lua runtime with the directives and the `chpack` table registered.
pub fn create_runtime(builder: Rc<RefCell<DescriptorBuilder>>) -> LuaResult<Lua> {
  let lua = Lua::new();
  globals::register_globals(&lua, builder)?;
  Ok(lua)
}

/// Load and execute a descriptor file.
///
/// Sets `chpack.dir` to the directory of the file and lets `require` find
/// Lua modules next to it.
pub fn load_file(lua: &Lua, path: &Path) -> LuaResult<()> {
  let canonical_path = path
    .canonicalize()
    .map_err(|e| LuaError::external(format!("cannot canonicalize '{}': {}", path.display(), e)))?;
  let content = std::fs::read_to_string(&canonical_path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", canonical_path.display(), e)))?;
  let dir = canonical_path
    .parent()
    .unwrap_or(Path::new(""))
    .to_string_lossy()
    .to_string();

  let package = lua.globals().get::<LuaTable>("package")?;
  let package_path = package.get::<String>("path")?;
  package.set("path", format!("{dir}/?.lua;{dir}/?/init.lua;{package_path}"))?;

  lua.globals().get::<LuaTable>("chpack")?.set("dir", dir)?;

  lua
    .load(&content)
    .set_name(format!("@{}", canonical_path.display()))
    .exec()
}
