use std::sync::Arc;

use fwnav_config::AmbiguousCallMode;
use fwnav_graph::ModuleType;

use super::test_helpers::*;
use crate::error::QueryError;
use crate::query::{Certainty, QueryEngine, QueryOptions, StopReason};
use crate::runtime::MemoryRuntime;

fn engine(runtime: MemoryRuntime, feature_x: bool, options: QueryOptions) -> QueryEngine {
    let value = if feature_x { "TRUE" } else { "FALSE" };
    let output = run(&runtime, PLATFORM, &flags(&[("FEATURE_X", value)])).unwrap();
    QueryEngine::new(
        Arc::new(output.context),
        Arc::new(output.graph),
        Arc::new(runtime),
        options,
    )
}

fn demo_engine(feature_x: bool) -> QueryEngine {
    engine(demo_runtime(), feature_x, QueryOptions::default())
}

fn traced(query: &QueryEngine, name: &str, depth: usize) -> Vec<(Vec<String>, StopReason)> {
    query
        .trace_call_path(name, depth)
        .unwrap()
        .into_iter()
        .map(|p| (p.functions().map(str::to_string).collect(), p.stop))
        .collect()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn lists_modules_by_type() {
    let query = demo_engine(true);
    assert_eq!(query.list_modules(None).len(), 6);
    let drivers: Vec<_> = query
        .list_modules(Some(ModuleType::UefiDriver))
        .iter()
        .map(|m| m.name.clone())
        .collect();
    assert_eq!(drivers, ["M1", "M2"]);
    assert_eq!(query.list_modules(Some(ModuleType::Peim)).len(), 0);
    assert_eq!(query.list_components().len(), 2);
}

#[test]
fn function_lookup_is_scoped_to_the_build() {
    let without = demo_engine(false);
    assert!(without.find_function("M1Entry").unwrap().is_empty());
    assert!(without.find_function("UnlistedHelper").unwrap().is_empty());

    let with = demo_engine(true);
    let entry = with.find_function("M1Entry").unwrap();
    assert_eq!(entry.len(), 1);
    assert_eq!(entry[0].module, id("Drivers/M1/M1.inf"));
    assert!(entry[0].file.ends_with("Drivers/M1/M1.c"));
    assert_eq!(entry[0].line, 6);
    assert_eq!(entry[0].calling_convention.as_deref(), Some("EFIAPI"));
    assert_eq!(entry[0].end_line, 13);
    let params: Vec<_> = entry[0].parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(params, ["ImageHandle", "SystemTable"]);
    assert!(!entry[0].is_static);
    assert!(with.find_function("UnlistedHelper").unwrap().is_empty());
}

#[test]
fn declarations_are_reported_beside_definitions() {
    let query = demo_engine(false);
    let mut found: Vec<_> = query
        .find_function("LibAWork")
        .unwrap()
        .into_iter()
        .map(|f| (f.module.to_string(), f.is_definition()))
        .collect();
    found.sort();
    assert_eq!(
        found,
        [
            ("Drivers/M2/M2.inf".to_string(), false),
            ("Lib/LibA_Impl1/LibA_Impl1.inf".to_string(), true),
        ]
    );
}

#[test]
fn empty_names_are_rejected() {
    let query = demo_engine(false);
    assert!(matches!(query.find_function("  "), Err(QueryError::InvalidArgument(_))));
    assert!(matches!(query.trace_callers(""), Err(QueryError::InvalidArgument(_))));
    assert!(matches!(query.lookup_module(""), Err(QueryError::InvalidArgument(_))));
}

#[test]
fn module_dependencies_by_id_and_base_name() {
    let query = demo_engine(false);
    let by_name = query.module_dependencies("M2", true).unwrap();
    let by_id = query.module_dependencies("Drivers/M2/M2.inf", true).unwrap();
    assert_eq!(by_name, by_id);

    let direct: Vec<_> = by_name.direct.iter().map(|m| m.as_str()).collect();
    assert_eq!(direct, ["Lib/LibA_Impl1/LibA_Impl1.inf", "Lib/DriverLib/DriverLib.inf"]);
    let mut closure: Vec<_> = by_name.transitive.unwrap().iter().map(|m| m.to_string()).collect();
    closure.sort();
    assert_eq!(
        closure,
        [
            "Lib/BaseLib/BaseLib.inf",
            "Lib/DriverLib/DriverLib.inf",
            "Lib/LibA_Impl1/LibA_Impl1.inf",
        ]
    );
    assert!(by_name.dependents.is_empty());
    assert_eq!(by_name.library_mappings.len(), 2);

    let shallow = query.module_dependencies("BaseLib", false).unwrap();
    assert!(shallow.transitive.is_none());
    assert_eq!(shallow.dependents.len(), 2);
}

#[test]
fn unknown_and_ambiguous_modules() {
    let query = demo_engine(false);
    assert_eq!(
        query.module_dependencies("Nope", false),
        Err(QueryError::ModuleNotFound("Nope".into()))
    );
    // outside the build when FEATURE_X is off
    assert!(matches!(
        query.lookup_module("Drivers/M1/M1.inf"),
        Err(QueryError::ModuleNotFound(_))
    ));

    let runtime = demo_runtime().with_file(
        "Lib/LibA_Impl2/LibA_Impl2.inf",
        inf("LibA_Impl1", "BASE", "  LIBRARY_CLASS = LibA", &["LibA.c"], &["BaseLib"]),
    );
    let query = engine(runtime, true, QueryOptions::default());
    let Err(QueryError::AmbiguousModule { name, candidates }) = query.lookup_module("LibA_Impl1") else {
        panic!("expected an ambiguous lookup");
    };
    assert_eq!(name, "LibA_Impl1");
    assert_eq!(
        candidates,
        [id("Lib/LibA_Impl1/LibA_Impl1.inf"), id("Lib/LibA_Impl2/LibA_Impl2.inf")]
    );
}

#[test]
fn traces_follow_the_linked_instance() {
    let query = demo_engine(true);
    assert_eq!(
        traced(&query, "M2Entry", 4),
        [
            (names(&["M2Entry", "DriverHelper", "BaseHelper"]), StopReason::Leaf),
            (names(&["M2Entry", "LibAWork", "BaseHelper"]), StopReason::Leaf),
        ]
    );

    let paths = query.trace_call_path("M2Entry", 4).unwrap();
    assert!(paths.iter().all(|p| p.is_certain()));
    assert_eq!(paths[1].steps[1].module, id("Lib/LibA_Impl1/LibA_Impl1.inf"));
    assert_eq!(paths[1].steps[1].call_line, Some(12));

    let m1 = query.trace_call_path("M1Entry", 4).unwrap();
    assert_eq!(m1.len(), 1);
    assert_eq!(m1[0].steps[1].module, id("Lib/LibA_Impl2/LibA_Impl2.inf"));
}

#[test]
fn traces_respect_max_depth() {
    let query = demo_engine(true);
    let paths = query.trace_call_path("M2Entry", 1).unwrap();
    assert_eq!(paths.len(), 2);
    for path in &paths {
        assert!(path.depth() <= 1);
        assert_eq!(path.stop, StopReason::DepthLimit);
    }

    assert_eq!(
        traced(&query, "M2Entry", 0),
        [(names(&["M2Entry"]), StopReason::DepthLimit)]
    );
    assert!(matches!(
        query.trace_call_path("M2Entry", 17),
        Err(QueryError::InvalidArgument(_))
    ));
    assert!(traced(&query, "NotAFunction", 3).is_empty());
}

#[test]
fn recursion_ends_the_path() {
    let query = demo_engine(false);
    assert_eq!(
        traced(&query, "Factorial", 8),
        [(names(&["Factorial"]), StopReason::Recursion)]
    );
}

#[test]
fn ambiguous_roots_are_traced_separately() {
    let query = demo_engine(true);
    let paths = query.trace_call_path("LibAWork", 3).unwrap();
    let roots: Vec<_> = paths.iter().map(|p| p.steps[0].module.to_string()).collect();
    assert_eq!(roots, ["Lib/LibA_Impl2/LibA_Impl2.inf", "Lib/LibA_Impl1/LibA_Impl1.inf"]);
}

#[test]
fn indirect_calls_follow_the_configured_mode() {
    let indirect = "VOID\nDriverHelper (\n  VOID\n  )\n{\n  mOps->BaseHelper (0);\n}\n";

    let runtime = demo_runtime().with_file("Lib/DriverLib/DriverLib.c", indirect);
    let dropped = engine(runtime, false, QueryOptions::default());
    assert_eq!(
        traced(&dropped, "DriverHelper", 4),
        [(names(&["DriverHelper"]), StopReason::Leaf)]
    );

    let runtime = demo_runtime().with_file("Lib/DriverLib/DriverLib.c", indirect);
    let options = QueryOptions::default().with_ambiguous_calls(AmbiguousCallMode::Surface);
    let surfaced = engine(runtime, false, options);
    let paths = surfaced.trace_call_path("DriverHelper", 4).unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].functions().collect::<Vec<_>>(), ["DriverHelper", "BaseHelper"]);
    assert_eq!(paths[0].steps[1].certainty, Certainty::Uncertain);
    assert!(!paths[0].is_certain());
}

#[test]
fn callers_are_collected_across_modules() {
    let query = demo_engine(true);
    let mut callers: Vec<_> = query
        .trace_callers("BaseHelper")
        .unwrap()
        .into_iter()
        .map(|c| (c.caller, c.module.to_string()))
        .collect();
    callers.sort();
    assert_eq!(
        callers,
        [
            ("DriverHelper".to_string(), "Lib/DriverLib/DriverLib.inf".to_string()),
            ("LibAWork".to_string(), "Lib/LibA_Impl1/LibA_Impl1.inf".to_string()),
            ("LibAWork".to_string(), "Lib/LibA_Impl2/LibA_Impl2.inf".to_string()),
            ("LibAWork".to_string(), "Lib/LibA_Impl2/LibA_Impl2.inf".to_string()),
        ]
    );
    assert!(query.trace_callers("M2Entry").unwrap().is_empty());
}

#[test]
fn dependency_chains_explain_a_link() {
    let query = demo_engine(true);
    let analysis = query.dependency_chains("BaseLib").unwrap();
    let mut chains: Vec<_> = analysis.chains.iter().map(|c| c.format_chain()).collect();
    chains.sort();
    assert_eq!(
        chains,
        [
            "Drivers/M1/M1.inf -> Lib/LibA_Impl2/LibA_Impl2.inf -> Lib/BaseLib/BaseLib.inf",
            "Drivers/M2/M2.inf -> Lib/DriverLib/DriverLib.inf -> Lib/BaseLib/BaseLib.inf",
            "Drivers/M2/M2.inf -> Lib/LibA_Impl1/LibA_Impl1.inf -> Lib/BaseLib/BaseLib.inf",
        ]
    );
    assert_eq!(analysis.entry_point_count, 2);
    assert_eq!(analysis.min_depth, Some(2));
}

const PING_PONG_C: &str = r#"
VOID
DriverHelper (
  VOID
  )
{
  Ping ();
}

VOID
Ping (VOID)
{
  Pong ();
}

VOID
Pong (VOID)
{
  Ping ();
  DriverHelper ();
}
"#;

#[test]
fn recursive_calls_are_reported_once_per_cycle() {
    let runtime = demo_runtime().with_file("Lib/DriverLib/DriverLib.c", PING_PONG_C);
    let query = engine(runtime, false, QueryOptions::default());
    let cycles = query.recursive_calls();
    let mut found: Vec<Vec<String>> = cycles
        .iter()
        .map(|c| c.functions().map(str::to_string).collect())
        .collect();
    found.sort();
    assert_eq!(
        found,
        [
            names(&["DriverHelper", "Ping", "Pong", "DriverHelper"]),
            names(&["Factorial", "Factorial"]),
            names(&["Ping", "Pong", "Ping"]),
        ]
    );

    let factorial = cycles.iter().find(|c| c.steps[0].function == "Factorial").unwrap();
    assert_eq!(factorial.len(), 1);
    assert_eq!(factorial.steps[1].call_line, Some(18));
    assert_eq!(factorial.steps[1].module, id("Lib/BaseLib/BaseLib.inf"));
}

#[test]
fn acyclic_builds_have_no_recursive_calls() {
    let runtime = demo_runtime().with_file(
        "Lib/BaseLib/BaseLib.c",
        "UINTN\nBaseHelper (\n  IN UINTN  Value\n  )\n{\n  return Value;\n}\n",
    );
    let query = engine(runtime, true, QueryOptions::default());
    assert!(query.recursive_calls().is_empty());
}

#[test]
fn call_depths_are_shortest_distances() {
    let query = demo_engine(true);
    let depths: Vec<_> = query
        .call_depths("M2Entry", 4)
        .unwrap()
        .into_iter()
        .map(|d| (d.function, d.depth))
        .collect();
    assert_eq!(
        depths,
        [
            ("M2Entry".to_string(), 0),
            ("DriverHelper".to_string(), 1),
            ("LibAWork".to_string(), 1),
            ("BaseHelper".to_string(), 2),
        ]
    );

    let shallow = query.call_depths("M2Entry", 1).unwrap();
    assert_eq!(shallow.len(), 3);
    assert_eq!(shallow[2].module, id("Lib/LibA_Impl1/LibA_Impl1.inf"));
    assert!(query.call_depths("NotAFunction", 3).unwrap().is_empty());
    assert!(matches!(query.call_depths("M2Entry", 17), Err(QueryError::InvalidArgument(_))));
}

#[test]
fn function_metrics_count_calls_both_ways() {
    let query = demo_engine(true);
    let work = query.function_metrics("LibAWork").unwrap();
    assert_eq!(work.definitions, 2);
    assert_eq!(work.calls_made, 3);
    assert_eq!(work.unique_callees, 1);
    assert_eq!(work.call_sites, 2);
    assert_eq!(work.called_by, 2);
    assert_eq!(work.max_call_depth, 1);

    let entry = query.function_metrics("M2Entry").unwrap();
    assert_eq!((entry.calls_made, entry.unique_callees), (2, 2));
    assert_eq!((entry.call_sites, entry.called_by), (0, 0));
    assert_eq!(entry.max_call_depth, 2);

    let unknown = query.function_metrics("Nope").unwrap();
    assert_eq!(unknown.definitions, 0);
    assert_eq!(unknown.max_call_depth, 0);
    assert!(matches!(query.function_metrics(" "), Err(QueryError::InvalidArgument(_))));
}

#[test]
fn include_graph_follows_headers_listed_by_other_modules() {
    let runtime = demo_runtime()
        .with_file(
            "Lib/BaseLib/BaseLib.inf",
            inf("BaseLib", "BASE", "  LIBRARY_CLASS = BaseLib", &["BaseLib.c", "BaseLib.h"], &[]),
        )
        .with_file("Lib/BaseLib/BaseLib.h", "UINTN\nBaseHelper (\n  IN UINTN  Value\n  );\n")
        .with_file("Lib/LibA_Impl1/LibA.c", format!("#include <BaseLib.h>\n{LIBA_IMPL1_C}"));
    let query = engine(runtime, false, QueryOptions::default());

    let graph = query.include_graph();
    assert_eq!(graph.len(), 1);
    assert_eq!(
        graph.get(&id("Lib/LibA_Impl1/LibA_Impl1.inf")),
        Some(&vec![id("Lib/BaseLib/BaseLib.inf")])
    );
    // M2.c includes its own header
    assert!(!graph.contains_key(&id("Drivers/M2/M2.inf")));
}
