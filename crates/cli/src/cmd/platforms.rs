use anyhow::Result;
use serde::Serialize;

use chpack_lib::platform::{Bootstrap, registry};

use crate::output::{OutputFormat, print_json};

#[derive(Serialize)]
struct PlatformRow {
  id: String,
  format: &'static str,
  bootstrap: &'static str,
}

pub fn cmd_platforms(format: OutputFormat) -> Result<()> {
  let rows: Vec<PlatformRow> = registry::entries()
    .iter()
    .map(|entry| PlatformRow {
      id: entry.id().to_string(),
      format: entry.family.package_format().as_str(),
      bootstrap: match entry.bootstrap {
        Bootstrap::PackageIndex { .. } => "rpm",
        Bootstrap::Debootstrap { codename, .. } => codename,
      },
    })
    .collect();

  if format.is_json() {
    return print_json(&rows);
  }

  println!("Supported platforms:");
  for row in &rows {
    println!("  {:<10} {:<4} {}", row.id, row.format, row.bootstrap);
  }
  Ok(())
}
