//! Validated enumerations used throughout descriptor records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when an enumeration value in a descriptor is not recognized.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! descriptor_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical spelling used in descriptor files.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let upper = s.trim().to_ascii_uppercase();
                match upper.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownValue {
                        kind: $kind,
                        value: s.trim().to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

descriptor_enum! {
    /// Module type declared by `MODULE_TYPE` in a module descriptor.
    ModuleType, "module type" {
        Base => "BASE",
        Sec => "SEC",
        PeiCore => "PEI_CORE",
        Peim => "PEIM",
        DxeCore => "DXE_CORE",
        DxeDriver => "DXE_DRIVER",
        DxeRuntimeDriver => "DXE_RUNTIME_DRIVER",
        DxeSalDriver => "DXE_SAL_DRIVER",
        DxeSmmDriver => "DXE_SMM_DRIVER",
        SmmCore => "SMM_CORE",
        MmStandalone => "MM_STANDALONE",
        MmCoreStandalone => "MM_CORE_STANDALONE",
        UefiDriver => "UEFI_DRIVER",
        UefiApplication => "UEFI_APPLICATION",
        HostApplication => "HOST_APPLICATION",
        UserDefined => "USER_DEFINED",
    }
}

descriptor_enum! {
    /// Target architecture.
    ///
    /// The `common` qualifier in section headers is not an architecture; it
    /// is modeled as "no architecture restriction" by the parser.
    Arch, "architecture" {
        Ia32 => "IA32",
        X64 => "X64",
        Arm => "ARM",
        Aarch64 => "AARCH64",
        RiscV64 => "RISCV64",
        LoongArch64 => "LOONGARCH64",
        Ebc => "EBC",
    }
}
