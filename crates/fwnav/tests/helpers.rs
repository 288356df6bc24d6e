//! Shared test utilities for fwnav integration tests.
//!
//! Builds small EDK2-style workspaces either in memory or on disk and wires
//! them into a [`Navigator`].

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fwnav::{CacheStore, MemoryRuntime, Navigator, NavigatorConfig};

pub const ROOT: &str = "/ws";
pub const PLATFORM: &str = "Demo/Demo.dsc";

pub const DEMO_DSC: &str = r#"
[Defines]
  PLATFORM_NAME           = Demo
  SUPPORTED_ARCHITECTURES = X64
  BUILD_TARGETS           = DEBUG|RELEASE

[LibraryClasses]
  LibA|Lib/LibA_Impl1/LibA_Impl1.inf
  BaseLib|Lib/BaseLib/BaseLib.inf

[Components]
!if FEATURE_X
  Drivers/M1/M1.inf {
    <LibraryClasses>
      LibA|Lib/LibA_Impl2/LibA_Impl2.inf
  }
!endif
  Drivers/M2/M2.inf
"#;

/// Module descriptor text with the given `[Defines]` extras, sources and classes.
pub fn inf(name: &str, module_type: &str, extra_defines: &str, sources: &[&str], classes: &[&str]) -> String {
    let mut text = format!("[Defines]\n  BASE_NAME   = {name}\n  MODULE_TYPE = {module_type}\n{extra_defines}\n");
    text.push_str("[Sources]\n");
    for source in sources {
        text.push_str(&format!("  {source}\n"));
    }
    text.push_str("\n[LibraryClasses]\n");
    for class in classes {
        text.push_str(&format!("  {class}\n"));
    }
    text
}

/// Every file of the demo workspace, relative to its root.
pub fn demo_files() -> Vec<(&'static str, String)> {
    vec![
        (PLATFORM, DEMO_DSC.to_string()),
        (
            "Drivers/M1/M1.inf",
            inf("M1", "UEFI_DRIVER", "  ENTRY_POINT = M1Entry", &["M1.c"], &["LibA"]),
        ),
        (
            "Drivers/M1/M1.c",
            "EFI_STATUS\nEFIAPI\nM1Entry (\n  IN EFI_HANDLE  ImageHandle\n  )\n{\n  return LibAWork (1);\n}\n".to_string(),
        ),
        (
            "Drivers/M2/M2.inf",
            inf("M2", "UEFI_DRIVER", "  ENTRY_POINT = M2Entry", &["M2.c"], &["LibA"]),
        ),
        (
            "Drivers/M2/M2.c",
            "EFI_STATUS\nEFIAPI\nM2Entry (\n  IN EFI_HANDLE  ImageHandle\n  )\n{\n  return LibAWork (2);\n}\n".to_string(),
        ),
        (
            "Lib/LibA_Impl1/LibA_Impl1.inf",
            inf("LibA_Impl1", "BASE", "  LIBRARY_CLASS = LibA", &["LibA.c"], &["BaseLib"]),
        ),
        (
            "Lib/LibA_Impl1/LibA.c",
            "UINTN\nLibAWork (\n  IN UINTN  Value\n  )\n{\n  return BaseHelper (Value);\n}\n".to_string(),
        ),
        (
            "Lib/LibA_Impl2/LibA_Impl2.inf",
            inf("LibA_Impl2", "BASE", "  LIBRARY_CLASS = LibA", &["LibA.c"], &["BaseLib"]),
        ),
        (
            "Lib/LibA_Impl2/LibA.c",
            "UINTN\nLibAWork (\n  IN UINTN  Value\n  )\n{\n  return BaseHelper (Value + 1);\n}\n".to_string(),
        ),
        (
            "Lib/BaseLib/BaseLib.inf",
            inf("BaseLib", "BASE", "  LIBRARY_CLASS = BaseLib", &["BaseLib.c"], &[]),
        ),
        (
            "Lib/BaseLib/BaseLib.c",
            "UINTN\nBaseHelper (\n  IN UINTN  Value\n  )\n{\n  return Value;\n}\n".to_string(),
        ),
    ]
}

pub fn demo_runtime() -> Arc<MemoryRuntime> {
    let runtime = MemoryRuntime::new(ROOT);
    for (path, contents) in demo_files() {
        runtime.insert(path, contents);
    }
    Arc::new(runtime)
}

/// Write the demo workspace under `root`.
pub fn write_demo_tree(root: &Path) {
    for (path, contents) in demo_files() {
        let path = root.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

pub fn config_for(root: impl AsRef<Path>) -> NavigatorConfig {
    let mut config = NavigatorConfig::default();
    config.workspace.root = Some(root.as_ref().to_path_buf());
    config
}

/// Navigator over `runtime` with an in-memory cache.
pub fn memory_navigator(runtime: &Arc<MemoryRuntime>) -> Navigator {
    memory_navigator_with(runtime, config_for(ROOT))
}

pub fn memory_navigator_with(runtime: &Arc<MemoryRuntime>, config: NavigatorConfig) -> Navigator {
    Navigator::with_runtime(runtime.clone(), config)
        .unwrap()
        .with_cache(CacheStore::in_memory(Duration::from_secs(3600)))
}

pub fn flags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn component_names(resolution: &fwnav::Resolution) -> Vec<String> {
    resolution
        .context
        .components()
        .map(|m| m.name.clone())
        .collect()
}
