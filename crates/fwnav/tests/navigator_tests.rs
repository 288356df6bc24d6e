//! End-to-end tests for the navigator: resolution, caching and deadlines.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use fwnav::{
    CacheStore, CyclePolicy, ModuleId, NavError, Navigator, ResolutionScope, ResolutionSource,
};
use helpers::*;
use tempfile::TempDir;

fn id(path: &str) -> ModuleId {
    ModuleId::new(path).unwrap()
}

#[test]
fn test_feature_flag_selects_components_and_overrides() {
    let runtime = demo_runtime();
    let navigator = memory_navigator(&runtime);

    let off = navigator.resolve(PLATFORM, &flags(&[])).unwrap();
    assert_eq!(component_names(&off), ["M2"]);
    assert!(!off.context.contains(&id("Lib/LibA_Impl2/LibA_Impl2.inf")));

    let on = navigator.resolve(PLATFORM, &flags(&[("FEATURE_X", "TRUE")])).unwrap();
    assert_eq!(component_names(&on), ["M1", "M2"]);

    let query = navigator.query(&on);
    let m1 = query.module_dependencies("M1", false).unwrap();
    assert_eq!(m1.direct, [id("Lib/LibA_Impl2/LibA_Impl2.inf")]);
    assert_eq!(m1.library_mappings[0].scope, ResolutionScope::ModuleOverride);
    let m2 = query.module_dependencies("M2", false).unwrap();
    assert_eq!(m2.direct, [id("Lib/LibA_Impl1/LibA_Impl1.inf")]);
    assert_eq!(m2.library_mappings[0].scope, ResolutionScope::Global);

    let paths = query.trace_call_path("M1Entry", 4).unwrap();
    let functions: Vec<_> = paths[0].functions().collect();
    assert_eq!(functions, ["M1Entry", "LibAWork", "BaseHelper"]);
    assert_eq!(paths[0].steps[1].module, id("Lib/LibA_Impl2/LibA_Impl2.inf"));
}

#[test]
fn test_configured_flags_sit_beneath_call_flags() {
    let runtime = demo_runtime();
    let mut config = config_for(ROOT);
    config.resolution.flags = flags(&[("FEATURE_X", "TRUE")]);
    let navigator = memory_navigator_with(&runtime, config);

    let configured = navigator.resolve(PLATFORM, &flags(&[])).unwrap();
    assert_eq!(component_names(&configured), ["M1", "M2"]);

    let overridden = navigator.resolve(PLATFORM, &flags(&[("FEATURE_X", "FALSE")])).unwrap();
    assert_eq!(component_names(&overridden), ["M2"]);
}

#[test]
fn test_repeat_resolution_is_served_from_cache() {
    let runtime = demo_runtime();
    let navigator = memory_navigator(&runtime);
    let flags = flags(&[("FEATURE_X", "TRUE")]);

    let first = navigator.resolve(PLATFORM, &flags).unwrap();
    assert_eq!(first.source, ResolutionSource::Fresh);
    assert_eq!(first.parses, 6);

    let second = navigator.resolve(PLATFORM, &flags).unwrap();
    assert!(second.from_cache());
    assert_eq!(second.parses, 0);
    assert!(first.context.same_content(&second.context));
    assert_eq!(first.graph.to_json().unwrap(), second.graph.to_json().unwrap());

    let stats = navigator.cache().unwrap().stats().unwrap();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn test_flags_partition_the_cache() {
    let runtime = demo_runtime();
    let navigator = memory_navigator(&runtime);

    navigator.resolve(PLATFORM, &flags(&[])).unwrap();
    let other = navigator.resolve(PLATFORM, &flags(&[("FEATURE_X", "TRUE")])).unwrap();
    assert!(!other.from_cache());
    assert_eq!(navigator.cache().unwrap().stats().unwrap().entries, 2);
}

#[test]
fn test_descriptor_edit_invalidates_the_entry() {
    let runtime = demo_runtime();
    let navigator = memory_navigator(&runtime);
    let flags = flags(&[]);

    let before = navigator.resolve(PLATFORM, &flags).unwrap();
    assert_eq!(before.context.modules.len(), 3);

    // Impl1 stops linking BaseLib
    runtime.insert(
        "Lib/LibA_Impl1/LibA_Impl1.inf",
        inf("LibA_Impl1", "BASE", "  LIBRARY_CLASS = LibA", &["LibA.c"], &[]),
    );
    let after = navigator.resolve(PLATFORM, &flags).unwrap();
    assert_eq!(after.source, ResolutionSource::Fresh);
    assert_eq!(after.context.modules.len(), 2);
    assert!(!after.context.contains(&id("Lib/BaseLib/BaseLib.inf")));

    let again = navigator.resolve(PLATFORM, &flags).unwrap();
    assert!(again.from_cache());
    assert!(again.context.same_content(&after.context));
}

#[test]
fn test_explicit_invalidation() {
    let runtime = demo_runtime();
    let navigator = memory_navigator(&runtime);
    let flags = flags(&[]);

    navigator.resolve(PLATFORM, &flags).unwrap();
    navigator.invalidate(PLATFORM, &flags).unwrap();
    assert_eq!(navigator.cache().unwrap().stats().unwrap().entries, 0);
    assert!(!navigator.resolve(PLATFORM, &flags).unwrap().from_cache());
}

#[test]
fn test_expired_deadline_leaves_no_entry() {
    let runtime = demo_runtime();
    let mut config = config_for(ROOT);
    config.resolution.timeout_ms = Some(0);
    let navigator = memory_navigator_with(&runtime, config);

    let err = navigator.resolve(PLATFORM, &flags(&[])).unwrap_err();
    assert!(matches!(err, NavError::Timeout(d) if d == Duration::ZERO), "unexpected error: {err}");
    assert!(!err.is_system());
    assert_eq!(navigator.cache().unwrap().stats().unwrap().entries, 0);
}

#[test]
fn test_resolution_errors_do_not_poison_the_cache() {
    let runtime = demo_runtime();
    let navigator = memory_navigator(&runtime);
    runtime.remove("Lib/BaseLib/BaseLib.c");

    let err = navigator.resolve(PLATFORM, &flags(&[])).unwrap_err();
    assert!(matches!(err, NavError::Resolution(_)), "unexpected error: {err}");
    assert_eq!(navigator.cache().unwrap().stats().unwrap().entries, 0);

    runtime.insert("Lib/BaseLib/BaseLib.c", "VOID\nBaseHelper (VOID)\n{\n}\n");
    assert!(navigator.resolve(PLATFORM, &flags(&[])).is_ok());
}

#[test]
fn test_cycle_policy_comes_from_config() {
    let runtime = demo_runtime();
    runtime.insert(
        "Lib/BaseLib/BaseLib.inf",
        inf("BaseLib", "BASE", "  LIBRARY_CLASS = BaseLib", &["BaseLib.c"], &["LibA"]),
    );

    let strict = memory_navigator(&runtime);
    let err = strict.resolve(PLATFORM, &flags(&[])).unwrap_err();
    assert!(matches!(err, NavError::Resolution(fwnav::ResolutionError::Cycle { .. })));

    let mut config = config_for(ROOT);
    config.resolution.cycle_policy = CyclePolicy::BreakCycle;
    let lenient = memory_navigator_with(&runtime, config);
    let resolution = lenient.resolve(PLATFORM, &flags(&[])).unwrap();
    assert_eq!(resolution.graph.cycles().len(), 1);
}

#[test]
fn test_disk_cache_survives_navigator_restarts() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("ws");
    write_demo_tree(&root);
    let flags = flags(&[("FEATURE_X", "TRUE")]);

    let first = Navigator::new(config_for(&root)).unwrap();
    let fresh = first.resolve(PLATFORM, &flags).unwrap();
    assert!(!fresh.from_cache());
    assert!(root.join(".fwnav/cache").is_dir());

    let second = Navigator::new(config_for(&root)).unwrap();
    let cached = second.resolve(PLATFORM, &flags).unwrap();
    assert!(cached.from_cache());
    assert!(fresh.context.same_content(&cached.context));

    let query = second.query(&cached);
    let found = query.find_function("LibAWork").unwrap();
    assert_eq!(found.len(), 2);
    assert!(query.recursive_calls().is_empty());
    let metrics = query.function_metrics("LibAWork").unwrap();
    assert_eq!((metrics.definitions, metrics.max_call_depth), (2, 1));

    std::fs::write(root.join(PLATFORM), DEMO_DSC.replace("FEATURE_X", "FEATURE_Y")).unwrap();
    let edited = second.resolve(PLATFORM, &flags).unwrap();
    assert!(!edited.from_cache());
    assert_eq!(component_names(&edited), ["M2"]);
}

#[test]
fn test_shadowing_files_on_the_search_path_invalidate_the_entry() {
    let runtime = demo_runtime();
    let mut config = config_for(ROOT);
    config.workspace.packages_path = vec!["Extra".into()];
    let navigator = memory_navigator_with(&runtime, config);
    let flags = flags(&[]);

    // BaseLib only exists under the package path
    let base = inf("BaseLib", "BASE", "  LIBRARY_CLASS = BaseLib", &["BaseLib.c"], &[]);
    runtime.remove("Lib/BaseLib/BaseLib.inf");
    runtime.remove("Lib/BaseLib/BaseLib.c");
    runtime.insert("Extra/Lib/BaseLib/BaseLib.inf", base.clone());
    runtime.insert("Extra/Lib/BaseLib/BaseLib.c", "UINTN\nBaseHelper (VOID)\n{\n}\n");

    let first = navigator.resolve(PLATFORM, &flags).unwrap();
    assert!(first.context.inputs.iter().all(|p| !p.starts_with("/ws/Lib/BaseLib")));
    assert!(navigator.resolve(PLATFORM, &flags).unwrap().from_cache());

    // a copy in the workspace root now wins the search
    runtime.insert("Lib/BaseLib/BaseLib.inf", base);
    runtime.insert("Lib/BaseLib/BaseLib.c", "UINTN\nBaseHelper (VOID)\n{\n}\n");
    let shadowed = navigator.resolve(PLATFORM, &flags).unwrap();
    assert!(!shadowed.from_cache());
    assert!(shadowed.context.inputs.iter().any(|p| p.ends_with("Lib/BaseLib/BaseLib.inf") && p.starts_with("/ws/Lib")));
}

#[test]
fn test_include_next_to_the_platform_shadows_the_workspace_copy() {
    let runtime = demo_runtime();
    let navigator = memory_navigator(&runtime);
    let flags = flags(&[]);
    runtime.insert(PLATFORM, format!("!include Common.dsc.inc\n{DEMO_DSC}"));
    runtime.insert("Common.dsc.inc", "DEFINE SHARED = ROOT\n");

    let first = navigator.resolve(PLATFORM, &flags).unwrap();
    assert_eq!(first.context.macros.get("SHARED").map(String::as_str), Some("ROOT"));
    assert!(navigator.resolve(PLATFORM, &flags).unwrap().from_cache());

    runtime.insert("Demo/Common.dsc.inc", "DEFINE SHARED = LOCAL\n");
    let local = navigator.resolve(PLATFORM, &flags).unwrap();
    assert!(!local.from_cache());
    assert_eq!(local.context.macros.get("SHARED").map(String::as_str), Some("LOCAL"));
}

#[test]
fn test_cache_can_be_disabled() {
    let runtime = demo_runtime();
    let mut config = config_for(ROOT);
    config.cache.enabled = false;
    let navigator = Navigator::with_runtime(runtime.clone(), config).unwrap();
    assert!(navigator.cache().is_none());

    navigator.resolve(PLATFORM, &flags(&[])).unwrap();
    assert!(!navigator.resolve(PLATFORM, &flags(&[])).unwrap().from_cache());
}

#[tokio::test]
async fn test_async_resolution_within_budget() {
    let runtime = demo_runtime();
    let navigator = memory_navigator(&runtime);
    let flags = flags(&[("FEATURE_X", "TRUE")]);

    let fresh = navigator
        .resolve_async(PLATFORM, &flags, Duration::from_secs(30))
        .await
        .unwrap();
    assert!(!fresh.from_cache());

    let cached = navigator
        .resolve_async(PLATFORM, &flags, Duration::from_secs(30))
        .await
        .unwrap();
    assert!(cached.from_cache());
}

#[tokio::test]
async fn test_async_timeout_never_publishes() {
    let runtime = demo_runtime();
    let navigator = memory_navigator(&runtime);

    let err = navigator
        .resolve_async(PLATFORM, &flags(&[]), Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, NavError::Timeout(_)), "unexpected error: {err}");

    // give a straggling worker time to finish
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(navigator.cache().unwrap().stats().unwrap().entries, 0);
}

#[tokio::test]
async fn test_concurrent_resolutions_agree() {
    let runtime = demo_runtime();
    let navigator = Arc::new(memory_navigator(&runtime));
    let flags = flags(&[("FEATURE_X", "TRUE")]);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let navigator = Arc::clone(&navigator);
            let flags = flags.clone();
            tokio::spawn(async move {
                navigator
                    .resolve_async(PLATFORM, &flags, Duration::from_secs(30))
                    .await
            })
        })
        .collect();

    let mut contexts = Vec::new();
    for task in tasks {
        contexts.push(task.await.unwrap().unwrap().context);
    }
    assert!(contexts.windows(2).all(|w| w[0].same_content(&w[1])));
    assert_eq!(navigator.cache().unwrap().stats().unwrap().entries, 1);
}

#[test]
fn test_shared_store_across_navigators() {
    let runtime = demo_runtime();
    let store = CacheStore::in_memory(Duration::from_secs(60));
    let navigator = Navigator::with_runtime(runtime.clone(), config_for(ROOT))
        .unwrap()
        .with_cache(store);

    let clone = navigator.clone();
    navigator.resolve(PLATFORM, &flags(&[])).unwrap();
    assert!(clone.resolve(PLATFORM, &flags(&[])).unwrap().from_cache());
}
