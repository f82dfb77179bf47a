//! Lua bindings for descriptor directives.
//!
//! Every directive is a global function that forwards to the shared
//! [`DescriptorBuilder`]. A rejected directive raises a Lua error carrying the
//! configuration error, so evaluation stops at the offending line.
//!
//! ```lua
//! name "hello"
//! version "1.0.0"
//! description "Greets the world"
//! directories { "usr" }
//!
//! platform("ubuntu", 14)
//! build_dependencies { "build-essential" }
//! build [[
//!   ./configure --prefix=/usr
//!   make install
//! ]]
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;

use super::{DescriptorBuilder, DescriptorError};
use crate::platform::PlatformId;

/// Directives taking a list of strings.
type ListDirective = fn(&mut DescriptorBuilder, &[String]) -> Result<(), DescriptorError>;

/// Directives taking a single string.
type TextDirective = fn(&mut DescriptorBuilder, &str) -> Result<(), DescriptorError>;

const TEXT_DIRECTIVES: &[(&str, TextDirective)] = &[
  ("name", DescriptorBuilder::name),
  ("version", DescriptorBuilder::version),
  ("description", DescriptorBuilder::description),
  ("license", DescriptorBuilder::license),
  ("maintainer", DescriptorBuilder::maintainer),
  ("url", DescriptorBuilder::url),
  ("vendor", DescriptorBuilder::vendor),
];

const LIST_DIRECTIVES: &[(&str, ListDirective)] = &[
  ("directories", DescriptorBuilder::directories),
  ("replaces", DescriptorBuilder::replaces),
  ("conflicts", DescriptorBuilder::conflicts),
  ("build_dependencies", DescriptorBuilder::build_dependencies),
  ("dependencies", DescriptorBuilder::dependencies),
  ("scripts", DescriptorBuilder::scripts),
];

/// Register every directive as a global function.
pub fn register_directives(lua: &Lua, builder: Rc<RefCell<DescriptorBuilder>>) -> LuaResult<()> {
  let globals = lua.globals();

  for (name, directive) in TEXT_DIRECTIVES {
    let builder = builder.clone();
    let directive = *directive;
    let func = lua.create_function(move |_, value: String| {
      directive(&mut builder.borrow_mut(), &value).map_err(LuaError::external)
    })?;
    globals.set(*name, func)?;
  }

  for (name, directive) in LIST_DIRECTIVES {
    let builder = builder.clone();
    let directive = *directive;
    let list_name = *name;
    let func = lua.create_function(move |_, value: LuaValue| {
      let values = string_list(list_name, value)?;
      directive(&mut builder.borrow_mut(), &values).map_err(LuaError::external)
    })?;
    globals.set(*name, func)?;
  }

  let epoch_builder = builder.clone();
  globals.set(
    "epoch",
    lua.create_function(move |_, value: i64| {
      let epoch = u32::try_from(value)
        .map_err(|_| LuaError::external(format!("epoch must be a non-negative integer, got {}", value)))?;
      epoch_builder.borrow_mut().epoch(epoch);
      Ok(())
    })?,
  )?;

  // platform("ubuntu", 14), platform("ubuntu", "14") or platform("ubuntu14")
  let platform_builder = builder.clone();
  globals.set(
    "platform",
    lua.create_function(move |_, (family, version): (String, Option<LuaValue>)| {
      let (family, version) = match version {
        None | Some(LuaValue::Nil) => {
          let id: PlatformId = family
            .parse()
            .map_err(|e: crate::platform::PlatformError| {
              LuaError::external(DescriptorError::InvalidPlatform(e.to_string()))
            })?;
          (id.family.as_str().to_string(), id.version)
        }
        Some(LuaValue::Integer(n)) => (family, n.to_string()),
        Some(LuaValue::Number(n)) => (family, n.to_string()),
        Some(LuaValue::String(s)) => (family, s.to_str()?.to_string()),
        Some(other) => {
          return Err(LuaError::external(format!(
            "platform version must be a string or number, got {}",
            other.type_name()
          )));
        }
      };
      platform_builder
        .borrow_mut()
        .platform(&family, &version)
        .map_err(LuaError::external)
    })?,
  )?;

  // build "..." or build(function() return "..." end)
  globals.set(
    "build",
    lua.create_function(move |_, value: LuaValue| {
      let body = match value {
        LuaValue::String(s) => s.to_str()?.to_string(),
        LuaValue::Function(f) => f.call::<String>(())?,
        other => {
          return Err(LuaError::external(format!(
            "build expects a string or a function returning a string, got {}",
            other.type_name()
          )));
        }
      };
      builder.borrow_mut().build_script(&body).map_err(LuaError::external)
    })?,
  )?;

  Ok(())
}

/// Accept either a single string or a sequence of strings.
fn string_list(directive: &str, value: LuaValue) -> LuaResult<Vec<String>> {
  match value {
    LuaValue::String(s) => Ok(vec![s.to_str()?.to_string()]),
    LuaValue::Table(t) => t.sequence_values::<String>().collect(),
    other => Err(LuaError::external(format!(
      "{} expects a string or a list of strings, got {}",
      directive,
      other.type_name()
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::descriptor::{BuildDescriptor, LifecycleHook};

  fn eval(source: &str) -> (LuaResult<()>, Rc<RefCell<DescriptorBuilder>>) {
    let lua = Lua::new();
    let builder = Rc::new(RefCell::new(DescriptorBuilder::new()));
    register_directives(&lua, builder.clone()).unwrap();
    let result = lua.load(source).exec();
    (result, builder)
  }

  fn descriptor(source: &str) -> BuildDescriptor {
    let (result, builder) = eval(source);
    result.unwrap();
    std::mem::take(&mut *builder.borrow_mut()).build().unwrap()
  }

  const HEADER: &str = r#"
    name "hello"
    version "1.0.0"
    description "Greets the world"
    directories { "usr" }
  "#;

  #[test]
  fn directives_build_a_descriptor() {
    let source = format!(
      r#"{}
      epoch(2)
      license "MIT"
      platform("ubuntu", 14)
      build_dependencies {{ "build-essential", "autoconf" }}
      dependencies "libc6"
      build [[make install]]
      platform("centos", "7")
      replaces {{ "hello-old" }}
      "#,
      HEADER
    );

    let d = descriptor(&source);

    assert_eq!(d.name, "hello");
    assert_eq!(d.directories, vec!["usr"]);
    assert_eq!(d.epoch, Some(2));
    assert_eq!(d.license.as_deref(), Some("MIT"));
    assert_eq!(d.platforms.len(), 2);
    assert_eq!(d.platforms[0].id.to_string(), "ubuntu14");
    assert_eq!(d.platforms[0].build_dependencies, vec!["build-essential", "autoconf"]);
    assert_eq!(d.platforms[0].dependencies, vec!["libc6"]);
    assert_eq!(d.platforms[0].build_script, "make install");
    assert_eq!(d.platforms[1].id.to_string(), "centos7");
    assert_eq!(d.platforms[1].replaces, vec!["hello-old"]);
    assert!(d.platforms[1].build_script.is_empty());
  }

  #[test]
  fn platform_accepts_combined_id() {
    let d = descriptor(&format!("{}\nplatform 'debian8'", HEADER));
    assert_eq!(d.platforms[0].id.to_string(), "debian8");
  }

  #[test]
  fn block_script_is_kept_verbatim() {
    let source = format!(
      r#"{}
      platform("ubuntu", 14)
      build(function()
        return [[
cd "$SRC" && ./configure --prefix=/usr
make -j$(nproc) 'install' > /dev/null 2>&1 || exit 1
echo `date` ${{HOME}}
]]
      end)
      "#,
      HEADER
    );

    let d = descriptor(&source);

    assert_eq!(
      d.platforms[0].build_script,
      "cd \"$SRC\" && ./configure --prefix=/usr\nmake -j$(nproc) 'install' > /dev/null 2>&1 || exit 1\necho `date` ${HOME}\n"
    );
  }

  #[test]
  fn scoped_directive_without_platform_fails() {
    let (result, builder) = eval(&format!("{}\nreplaces {{ 'x' }}", HEADER));

    let message = result.unwrap_err().to_string();
    assert!(message.contains("replaces"), "unexpected error: {}", message);
    assert!(std::mem::take(&mut *builder.borrow_mut()).build().is_err());
  }

  #[test]
  fn evaluation_stops_at_first_rejected_directive() {
    let (result, builder) = eval(&format!(
      "{}\nplatform('ubuntu', 14)\nplatform('ubuntu', 14)\nplatform('centos', 7)",
      HEADER
    ));

    assert!(result.unwrap_err().to_string().contains("ubuntu14"));
    let d = std::mem::take(&mut *builder.borrow_mut()).build().unwrap();
    assert_eq!(d.platforms.len(), 1);
  }

  #[test]
  fn lifecycle_scripts_are_matched_by_name() {
    let d = descriptor(&format!(
      "{}\nplatform('centos', 7)\nscripts {{ 'pkg/before_install.sh', 'pkg/after-remove' }}",
      HEADER
    ));

    let hooks: Vec<LifecycleHook> = d.platforms[0].scripts.keys().copied().collect();
    assert_eq!(hooks, vec![LifecycleHook::BeforeInstall, LifecycleHook::AfterRemove]);
  }

  #[test]
  fn path_like_values_are_rejected() {
    let (result, builder) = eval("name '../../../../home/victim/data'");
    assert!(result.unwrap_err().to_string().contains("invalid package name"));
    assert!(std::mem::take(&mut *builder.borrow_mut()).build().is_err());

    let (result, _) = eval("directories { 'usr', '../../hostsecret' }");
    assert!(result.unwrap_err().to_string().contains("'..'"));
  }

  #[test]
  fn wrong_argument_types_are_rejected() {
    let (result, _) = eval("directories(42)");
    assert!(result.unwrap_err().to_string().contains("directories expects"));

    let (result, _) = eval("platform('ubuntu', 14)\nbuild(true)");
    assert!(result.unwrap_err().to_string().contains("build expects"));

    let (result, _) = eval("epoch(-1)");
    assert!(result.unwrap_err().to_string().contains("epoch"));
  }
}
