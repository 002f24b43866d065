use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Build variant layered over the shared toolchain profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Configuration {
    Release,
    Debug,
}

impl Configuration {
    pub const ALL: [Configuration; 2] = [Configuration::Release, Configuration::Debug];

    /// Directory name used to namespace outputs.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Configuration::Release => "release",
            Configuration::Debug => "debug",
        }
    }

    /// Optimization and debug-info flags used when the manifest gives none.
    pub fn default_flags(&self) -> Vec<String> {
        let flags: &[&str] = match self {
            Configuration::Release => &["-O2", "-DNDEBUG"],
            Configuration::Debug => &["-Og", "-g3", "-DDEBUG"],
        };
        flags.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Configuration::Release => f.write_str("Release"),
            Configuration::Debug => f.write_str("Debug"),
        }
    }
}

impl FromStr for Configuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(Configuration::Release),
            "debug" => Ok(Configuration::Debug),
            other => Err(format!(
                "unknown configuration '{}' (expected Release or Debug)",
                other
            )),
        }
    }
}

/// Which compiler driver a translation unit goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    C,
    Cpp,
    Asm,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "c" => Some(SourceKind::C),
            "cpp" | "cc" | "cxx" | "c++" => Some(SourceKind::Cpp),
            "s" | "S" | "asm" => Some(SourceKind::Asm),
            _ => None,
        }
    }
}

/// Compiler drivers per language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerPaths {
    pub c: Option<String>,
    pub cpp: Option<String>,
    pub asm: Option<String>,
}

/// Flags that select CPU, FPU, ABI or instruction set. These must be the
/// same for every translation unit of every configuration.
pub fn is_arch_flag(flag: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "-mcpu=",
        "-march=",
        "-mtune=",
        "-mfpu=",
        "-mfloat-abi=",
        "-mabi=",
    ];
    const EXACT: &[&str] = &["-mthumb", "-marm", "-mlittle-endian", "-mbig-endian"];
    PREFIXES.iter().any(|p| flag.starts_with(p)) || EXACT.contains(&flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_configuration_from_str() {
        assert_eq!("Release".parse::<Configuration>(), Ok(Configuration::Release));
        assert_eq!("debug".parse::<Configuration>(), Ok(Configuration::Debug));
        assert!("fast".parse::<Configuration>().is_err());
    }

    #[test]
    fn test_source_kind_by_extension() {
        assert_eq!(
            SourceKind::from_path(&PathBuf::from("Core/Src/main.c")),
            Some(SourceKind::C)
        );
        assert_eq!(
            SourceKind::from_path(&PathBuf::from("app/driver.cpp")),
            Some(SourceKind::Cpp)
        );
        assert_eq!(
            SourceKind::from_path(&PathBuf::from("startup_stm32f407xx.s")),
            Some(SourceKind::Asm)
        );
        assert_eq!(SourceKind::from_path(&PathBuf::from("main.h")), None);
    }

    #[test]
    fn test_arch_flag_detection() {
        assert!(is_arch_flag("-mcpu=cortex-m4"));
        assert!(is_arch_flag("-mfloat-abi=hard"));
        assert!(is_arch_flag("-mthumb"));
        assert!(!is_arch_flag("-mno-unaligned-access"));
        assert!(!is_arch_flag("-O2"));
    }
}
