//! Structured records for platform and module descriptors.
//!
//! Both parsers consume the output of the directive evaluator, so they only
//! ever see active, macro-expanded lines.

mod module;
mod platform;
pub mod section;

pub use module::parse_module;
pub use platform::{
    ComponentEntry, ComponentOverrides, LibraryClassEntry, NULL_CLASS, PlatformDescriptor,
    parse_platform,
};

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use fwnav_graph::{Arch, InterfaceKind, InterfaceUsage, ModuleId, ModuleType, ResolutionScope};

    use super::*;
    use crate::directive::{DirectiveEvaluator, EvaluatedText, MacroEnv};
    use crate::error::ParseError;
    use crate::runtime::MemoryRuntime;

    fn evaluate(text: &str) -> EvaluatedText {
        let runtime = MemoryRuntime::new("/ws").with_file("file", text);
        let roots = [PathBuf::from("/ws")];
        DirectiveEvaluator::new(&runtime, &roots)
            .evaluate(Path::new("/ws/file"), MacroEnv::default())
            .unwrap()
    }

    const PLATFORM: &str = r#"
[Defines]
  PLATFORM_NAME           = Demo
  PLATFORM_GUID           = 11111111-2222-3333-4444-555555555555
  SUPPORTED_ARCHITECTURES = X64|IA32
  BUILD_TARGETS           = DEBUG|RELEASE
  OUTPUT_DIRECTORY        = Build/Demo

[LibraryClasses]
  DebugLib|MdePkg/Library/BaseDebugLibNull/BaseDebugLibNull.inf
  BaseLib|MdePkg/Library/BaseLib/BaseLib.inf

[LibraryClasses.common.DXE_DRIVER, LibraryClasses.IA32]
  DebugLib|MdePkg/Library/UefiDebugLibConOut/UefiDebugLibConOut.inf

[LibraryClasses.X64]
  DebugLib|MdePkg/Library/BaseDebugLibSerialPort/BaseDebugLibSerialPort.inf
  NULL|MdePkg/Library/StackCheckLib/StackCheckLib.inf

[BuildOptions]
  MSFT:*_*_*_CC_FLAGS = /W4

[PcdsFixedAtBuild]
  gEfiMdePkgTokenSpaceGuid.PcdDebugPropertyMask|0x2F

[Components.IA32]
  DemoPkg/Pei/Pei.inf

[Components]
  DemoPkg/App/App.inf
  DemoPkg/Driver/Driver.inf
  {
    <Defines>
      FILE_GUID = 99999999-0000-0000-0000-000000000000
    <LibraryClasses>
      DebugLib|DemoPkg/Library/LoudDebugLib/LoudDebugLib.inf
      NULL|DemoPkg/Library/HookLib/HookLib.inf
    <BuildOptions>
      MSFT:*_*_*_CC_FLAGS = /Od
    <PcdsFixedAtBuild>
      gEfiMdePkgTokenSpaceGuid.PcdDebugPropertyMask|0xFF
  }
  DemoPkg/Last/Last.inf {
  }
"#;

    #[test]
    fn platform_sections() {
        let platform = parse_platform(&evaluate(PLATFORM), Arch::X64).unwrap();

        assert_eq!(platform.name.as_deref(), Some("Demo"));
        assert_eq!(platform.supported_archs, vec![Arch::X64, Arch::Ia32]);
        assert_eq!(platform.build_targets, vec!["DEBUG", "RELEASE"]);
        assert_eq!(platform.defines["OUTPUT_DIRECTORY"], "Build/Demo");
        assert_eq!(platform.build_options["MSFT:*_*_*_CC_FLAGS"], "/W4");
        assert_eq!(platform.pcds["gEfiMdePkgTokenSpaceGuid.PcdDebugPropertyMask"], "0x2F");

        let paths: Vec<_> = platform.components.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, ["DemoPkg/App/App.inf", "DemoPkg/Driver/Driver.inf", "DemoPkg/Last/Last.inf"]);
        assert!(platform.components[0].overrides.is_empty());
        assert!(platform.components[2].overrides.is_empty());

        let overrides = &platform.components[1].overrides;
        assert_eq!(overrides.defines["FILE_GUID"], "99999999-0000-0000-0000-000000000000");
        assert_eq!(overrides.library_classes.len(), 2);
        assert_eq!(overrides.library_classes[1].0, "NULL");
        assert_eq!(overrides.build_options["MSFT:*_*_*_CC_FLAGS"], "/Od");
        assert_eq!(overrides.pcds["gEfiMdePkgTokenSpaceGuid.PcdDebugPropertyMask"], "0xFF");

        assert_eq!(platform.null_libraries.len(), 1);
        assert_eq!(platform.null_libraries[0].scope(), ResolutionScope::Architecture);
    }

    #[test]
    fn platform_binding_precedence() {
        let platform = parse_platform(&evaluate(PLATFORM), Arch::X64).unwrap();

        let app = platform.library_binding("DebugLib", ModuleType::UefiApplication).unwrap();
        assert_eq!(app.scope(), ResolutionScope::Architecture);
        assert!(app.instance.contains("BaseDebugLibSerialPort"));

        let driver = platform.library_binding("DebugLib", ModuleType::DxeDriver).unwrap();
        assert_eq!(driver.scope(), ResolutionScope::Architecture);

        let base = platform.library_binding("BaseLib", ModuleType::DxeDriver).unwrap();
        assert_eq!(base.scope(), ResolutionScope::Global);
        assert!(platform.library_binding("PrintLib", ModuleType::DxeDriver).is_none());
    }

    #[test]
    fn arch_qualified_sections_follow_the_target() {
        let platform = parse_platform(&evaluate(PLATFORM), Arch::Ia32).unwrap();
        assert_eq!(platform.components[0].path, "DemoPkg/Pei/Pei.inf");
        assert!(platform.null_libraries.is_empty());

        let debug = platform.library_binding("DebugLib", ModuleType::Peim).unwrap();
        assert!(debug.instance.contains("UefiDebugLibConOut"));
    }

    #[test]
    fn override_block_must_close() {
        let err = parse_platform(&evaluate("[Components]\n  A/A.inf {\n"), Arch::X64).unwrap_err();
        assert!(matches!(err, ParseError::UnterminatedBlock { .. }));
    }

    const MODULE: &str = r#"
[Defines]
  INF_VERSION    = 0x00010005
  BASE_NAME      = UefiLib
  FILE_GUID      = 3a004ba5-efe0-4a61-9f1a-267a46ae5ba9
  MODULE_TYPE    = UEFI_DRIVER
  LIBRARY_CLASS  = UefiLib|DXE_DRIVER UEFI_APPLICATION UEFI_DRIVER
  ENTRY_POINT    = UefiLibConstructor

[Sources]
  UefiLib.c
  UefiLibPrint.c | MSFT
  Inc\UefiLibInternal.h

[Sources.IA32]
  Ia32/Thunk.c

[Packages]
  MdePkg/MdePkg.dec

[LibraryClasses]
  PrintLib
  DebugLib|MdePkg/Library/BaseDebugLibNull/BaseDebugLibNull.inf

[Protocols]
  gEfiDriverBindingProtocolGuid   ## SOMETIMES_PRODUCES
  gEfiSimpleTextOutProtocolGuid   ## CONSUMES

[Guids]
  gEfiGlobalVariableGuid

[Pcd]
  gEfiMdePkgTokenSpaceGuid.PcdUefiLibMaxPrintBufferSize
  gEfiMdePkgTokenSpaceGuid.PcdMaximumUnicodeStringLength|1000000

[BuildOptions]
  GCC:*_*_*_CC_FLAGS = -O2
"#;

    #[test]
    fn module_fields() {
        let id = ModuleId::new("MdePkg/Library/UefiLib/UefiLib.inf").unwrap();
        let path = Path::new("/ws/MdePkg/Library/UefiLib/UefiLib.inf");
        let module = parse_module(&evaluate(MODULE), id, path, Path::new("/ws"), Arch::X64).unwrap();

        assert_eq!(module.name, "UefiLib");
        assert_eq!(module.module_type, ModuleType::UefiDriver);
        assert_eq!(module.entry_point.as_deref(), Some("UefiLibConstructor"));
        assert!(module.is_library());
        let produced = module.produced_class("UefiLib").unwrap();
        assert!(produced.accepts(ModuleType::UefiApplication));
        assert!(!produced.accepts(ModuleType::Peim));

        assert_eq!(
            module.sources,
            vec![
                PathBuf::from("/ws/MdePkg/Library/UefiLib/UefiLib.c"),
                PathBuf::from("/ws/MdePkg/Library/UefiLib/UefiLibPrint.c"),
                PathBuf::from("/ws/MdePkg/Library/UefiLib/Inc/UefiLibInternal.h"),
            ]
        );
        assert_eq!(
            module.include_dirs,
            vec![PathBuf::from("/ws/MdePkg/Library/UefiLib"), PathBuf::from("/ws/MdePkg/Include")]
        );

        assert_eq!(module.library_classes.len(), 2);
        assert_eq!(module.library_classes[0].default_binding, None);
        assert_eq!(
            module.library_classes[1].default_binding.as_deref(),
            Some("MdePkg/Library/BaseDebugLibNull/BaseDebugLibNull.inf")
        );

        assert_eq!(module.interfaces.len(), 3);
        assert_eq!(module.interfaces[0].usage, InterfaceUsage::SometimesProduces);
        assert_eq!(module.interfaces[1].usage, InterfaceUsage::Consumes);
        assert_eq!(module.interfaces[2].kind, InterfaceKind::Guid);
        assert_eq!(module.produced_interfaces().count(), 1);

        assert_eq!(module.pcds["gEfiMdePkgTokenSpaceGuid.PcdUefiLibMaxPrintBufferSize"], "");
        assert_eq!(module.pcds["gEfiMdePkgTokenSpaceGuid.PcdMaximumUnicodeStringLength"], "1000000");
        assert_eq!(module.build_options["GCC:*_*_*_CC_FLAGS"], "-O2");
        assert_eq!(module.defines["INF_VERSION"], "0x00010005");
    }

    #[test]
    fn module_requires_base_name_and_type() {
        let id = ModuleId::new("A/A.inf").unwrap();
        let path = Path::new("/ws/A/A.inf");

        let err = parse_module(&evaluate("[Defines]\n MODULE_TYPE = BASE\n"), id.clone(), path, Path::new("/ws"), Arch::X64)
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingDefine { key: "BASE_NAME", .. }));

        let err = parse_module(
            &evaluate("[Defines]\n BASE_NAME = A\n MODULE_TYPE = DXE_THING\n"),
            id,
            path,
            Path::new("/ws"),
            Arch::X64,
        )
        .unwrap_err();
        let ParseError::InvalidValue { location, .. } = &err else {
            panic!("expected invalid value, got {err:?}");
        };
        assert_eq!(location.line, 3);
        assert!(err.to_string().contains("DXE_THING"));
    }
}
