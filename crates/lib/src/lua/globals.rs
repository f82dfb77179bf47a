//! The `chpack` global table.
//!
//! - `chpack.dir` - Directory of the descriptor being evaluated
//! - `chpack.read(path)` - Read a file relative to `chpack.dir`, for keeping
//!   long build scripts in their own files
//! - `chpack.join(...)` - Join path segments
//!
//! Descriptor directives (`name`, `platform`, `build`, ...) are registered
//! alongside it as plain globals.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;

use crate::descriptor::DescriptorBuilder;
use crate::descriptor::lua::register_directives;

pub fn register_globals(lua: &Lua, builder: Rc<RefCell<DescriptorBuilder>>) -> LuaResult<()> {
  let chpack = lua.create_table()?;
  chpack.set("dir", "")?;

  chpack.set(
    "read",
    lua.create_function(|lua, path: String| {
      let dir: String = lua.globals().get::<LuaTable>("chpack")?.get("dir")?;
      let full = Path::new(&dir).join(&path);
      std::fs::read_to_string(&full)
        .map_err(|e| LuaError::external(format!("cannot read '{}': {}", full.display(), e)))
    })?,
  )?;

  chpack.set(
    "join",
    lua.create_function(|_, segments: LuaMultiValue| {
      let mut result = PathBuf::new();
      for segment in segments {
        if let LuaValue::String(s) = segment {
          result.push(&*s.to_str()?);
        }
      }
      Ok(result.to_string_lossy().into_owned())
    })?,
  )?;

  lua.globals().set("chpack", chpack)?;
  register_directives(lua, builder)?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn create_test_lua() -> LuaResult<Lua> {
    let lua = Lua::new();
    register_globals(&lua, Rc::new(RefCell::new(DescriptorBuilder::new())))?;
    Ok(lua)
  }

  #[test]
  fn chpack_global_exists() -> LuaResult<()> {
    let lua = create_test_lua()?;
    let chpack: LuaTable = lua.globals().get("chpack")?;
    assert!(chpack.contains_key("dir")?);
    assert!(chpack.contains_key("read")?);
    assert!(chpack.contains_key("join")?);
    let platform: LuaValue = lua.globals().get("platform")?;
    assert!(platform.is_function());
    Ok(())
  }

  #[test]
  fn read_is_relative_to_descriptor_dir() -> LuaResult<()> {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("build.sh"), "make install\n").unwrap();
    let lua = create_test_lua()?;
    lua
      .globals()
      .get::<LuaTable>("chpack")?
      .set("dir", temp.path().to_string_lossy().to_string())?;

    let body: String = lua.load("return chpack.read('build.sh')").eval()?;

    assert_eq!(body, "make install\n");
    Ok(())
  }

  #[test]
  fn read_missing_file_fails() -> LuaResult<()> {
    let lua = create_test_lua()?;
    let result: LuaResult<String> = lua.load("return chpack.read('/nonexistent/build.sh')").eval();
    assert!(result.is_err());
    Ok(())
  }

  #[test]
  fn join_combines_segments() -> LuaResult<()> {
    let lua = create_test_lua()?;
    let joined: String = lua.load("return chpack.join('scripts', 'after-install.sh')").eval()?;
    assert_eq!(joined, "scripts/after-install.sh");
    Ok(())
  }
}
