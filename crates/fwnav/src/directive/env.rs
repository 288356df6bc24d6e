use std::collections::BTreeMap;
use std::sync::Arc;

/// Default target architecture when the platform names none.
pub const DEFAULT_ARCH: &str = "X64";
/// Default build profile when the platform names none.
pub const DEFAULT_TARGET: &str = "DEBUG";
/// Default toolchain tag.
pub const DEFAULT_TOOL_CHAIN_TAG: &str = "VS2019";

const TOOL_CHAIN_TAG: &str = "TOOL_CHAIN_TAG";
const TOOLCHAIN_ALIAS: &str = "TOOLCHAIN";

/// Immutable macro environment threaded through directive evaluation.
///
/// Lookups consult caller flags first, then descriptor defines, then the
/// language defaults. [`MacroEnv::define`] never shadows a flag and returns
/// a new environment instead of mutating this one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroEnv {
    flags: Arc<BTreeMap<String, String>>,
    defines: Arc<BTreeMap<String, String>>,
}

impl MacroEnv {
    pub fn new(flags: BTreeMap<String, String>) -> Self {
        let mut flags = flags;
        if let Some(tag) = flags.remove(TOOLCHAIN_ALIAS) {
            flags.entry(TOOL_CHAIN_TAG.to_string()).or_insert(tag);
        }
        Self {
            flags: Arc::new(flags),
            defines: Arc::default(),
        }
    }

    /// Environment with `name` bound to `value`.
    ///
    /// Caller flags win: defining a flagged name returns an unchanged copy.
    pub fn define(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if self.flags.contains_key(&name) {
            return self.clone();
        }
        let mut defines = (*self.defines).clone();
        defines.insert(name, value.into());
        Self {
            flags: Arc::clone(&self.flags),
            defines: Arc::new(defines),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.flags
            .get(name)
            .or_else(|| self.defines.get(name))
            .map(String::as_str)
            .or_else(|| self.default_value(name))
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn flags(&self) -> &BTreeMap<String, String> {
        &self.flags
    }

    fn first_listed(&self, key: &str) -> Option<&str> {
        self.defines
            .get(key)
            .and_then(|list| list.split(['|', ',', ' ']).map(str::trim).find(|s| !s.is_empty()))
    }

    fn default_value(&self, name: &str) -> Option<&str> {
        match name {
            "ARCH" => Some(self.first_listed("SUPPORTED_ARCHITECTURES").unwrap_or(DEFAULT_ARCH)),
            "TARGET" => Some(self.first_listed("BUILD_TARGETS").unwrap_or(DEFAULT_TARGET)),
            TOOL_CHAIN_TAG => Some(DEFAULT_TOOL_CHAIN_TAG),
            _ => None,
        }
    }

    /// Replace every `$(NAME)` with its value. Undefined references stay verbatim.
    pub fn expand(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("$(") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find(')') {
                Some(end) => {
                    let name = after[..end].trim();
                    match self.get(name) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[start..start + 2 + end + 1]),
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Every visible binding, defaults included.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let mut all = BTreeMap::new();
        for key in ["ARCH", "TARGET", TOOL_CHAIN_TAG] {
            if let Some(value) = self.default_value(key) {
                all.insert(key.to_string(), value.to_string());
            }
        }
        all.extend(self.defines.iter().map(|(k, v)| (k.clone(), v.clone())));
        all.extend(self.flags.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }
}
