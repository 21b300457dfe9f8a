//! Shared fixtures for integration and E2E tests.
//!
//! `project()` scaffolds a small but complete project into a temporary
//! directory: a configuration file, one declarative repository with a
//! repository option, and three modules. `uart` depends on `core` and
//! renders a template; `fpu` is only available for the `f7` target.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then:
//!
//! ```rust,ignore
//! let temp = common::project();
//! ```

use assert_fs::prelude::*;
use assert_fs::TempDir;

/// Project configuration written to `modbuild.yaml`.
pub const CONFIG: &str = r#"
repositories:
  - repo/repo.yaml
modules:
  - "repo:uart"
options:
  "repo:target": f4
outpath: generated
"#;

/// Scaffold a complete buildable project into a temporary directory.
pub fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    temp.child("modbuild.yaml").write_str(CONFIG).unwrap();

    temp.child("repo/repo.yaml")
        .write_str(
            r#"
repository:
  name: repo
  description: Example repository.
  options:
    - name: target
      description: Target device family.
      type: enum
      values: [f4, f7]
      default: f4
  modules:
    - core/module.yaml
    - uart/module.yaml
    - fpu/module.yaml
"#,
        )
        .unwrap();

    temp.child("repo/core/module.yaml")
        .write_str(
            r#"
module:
  name: core
  description: Runtime support.
  build:
    - copy: core.h
"#,
        )
        .unwrap();
    temp.child("repo/core/core.h")
        .write_str("#pragma once\n")
        .unwrap();

    temp.child("repo/uart/module.yaml")
        .write_str(
            r#"
module:
  name: uart
  description: Serial driver.
  depends: ["repo:core"]
  options:
    - name: baudrate
      description: Initial baudrate.
      type: numeric
      min: 1200
      max: 1000000
      default: 115200
  build:
    - copy: uart.h
    - template: uart.c.in
"#,
        )
        .unwrap();
    temp.child("repo/uart/uart.h")
        .write_str("#pragma once\n")
        .unwrap();
    temp.child("repo/uart/uart.c.in")
        .write_str("static const int baudrate = {{baudrate}};\n")
        .unwrap();

    temp.child("repo/fpu/module.yaml")
        .write_str(
            r#"
module:
  name: fpu
  description: Floating point support.
  available_if:
    - option: "repo:target"
      equals: f7
  build:
    - copy: fpu.h
"#,
        )
        .unwrap();
    temp.child("repo/fpu/fpu.h")
        .write_str("#pragma once\n")
        .unwrap();

    temp
}
