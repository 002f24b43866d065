use serde::Deserialize;
use std::collections::BTreeMap;

/// Root of `fw.toml`.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FwConfig {
    pub project: ProjectConfig,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    #[serde(default)]
    pub configuration: BTreeMap<String, ConfigurationConfig>,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetConfig>,
    pub flash: Option<FlashConfig>,
    pub debug: Option<DebugConfig>,
    pub scripts: Option<ScriptsConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ProjectConfig {
    pub name: String,
    pub build_dir: Option<String>,
    pub jobs: Option<usize>,
    pub max_diagnostics: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ToolchainConfig {
    pub cc: Option<String>,
    pub cxx: Option<String>,
    pub asm: Option<String>,
    pub objcopy: Option<String>,
    pub size: Option<String>,
    pub nm: Option<String>,
    #[serde(default)]
    pub arch_flags: Vec<String>,
    #[serde(default)]
    pub compile_flags: Vec<String>,
    #[serde(default)]
    pub link_flags: Vec<String>,
    pub linker_script: Option<String>,
    #[serde(default)]
    pub defines: Vec<String>,
}

/// `[configuration.release]` / `[configuration.debug]`
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ConfigurationConfig {
    pub flags: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TargetConfig {
    pub name: String,
    pub output: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceRootConfig>,
    #[serde(default)]
    pub include_dirs: Vec<String>,
    #[serde(default)]
    pub libs: Vec<String>,
    #[serde(default)]
    pub defines: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SourceRootConfig {
    pub pattern: String,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProgrammerKind {
    #[default]
    Openocd,
    Stm32Programmer,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FlashConfig {
    #[serde(default)]
    pub programmer: ProgrammerKind,
    pub path: Option<String>,
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_true")]
    pub reset_after: bool,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub config_files: Vec<String>,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            programmer: ProgrammerKind::default(),
            path: None,
            interface: default_interface(),
            reset_after: true,
            args: Vec::new(),
            config_files: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ServerKind {
    #[default]
    Openocd,
    StlinkGdbserver,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DebugConfig {
    #[serde(default)]
    pub server: ServerKind,
    pub server_path: Option<String>,
    pub gdb: Option<String>,
    #[serde(default = "default_gdb_port")]
    pub port: u16,
    pub adapter: Option<String>,
    pub chip: Option<String>,
    pub launch_config: Option<String>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            server: ServerKind::default(),
            server_path: None,
            gdb: None,
            port: default_gdb_port(),
            adapter: None,
            chip: None,
            launch_config: None,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ScriptsConfig {
    pub pre_build: Option<String>,
    pub post_build: Option<String>,
}

fn default_interface() -> String {
    "SWD".to_string()
}

fn default_true() -> bool {
    true
}

fn default_gdb_port() -> u16 {
    3333
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[project]
name = "blinky"
jobs = 4

[toolchain]
cc = "arm-none-eabi-gcc"
cxx = "arm-none-eabi-g++"
asm = "arm-none-eabi-gcc"
objcopy = "arm-none-eabi-objcopy"
size = "arm-none-eabi-size"
arch_flags = ["-mcpu=cortex-m4", "-mthumb"]
linker_script = "STM32F407VGTx_FLASH.ld"
defines = ["USE_HAL_DRIVER", "STM32F407xx"]

[configuration.debug]
flags = ["-O0", "-g3"]

[[target]]
name = "firmware"
output = "blinky"
sources = [{ pattern = "Core/Src/*.c" }, { pattern = "Drivers/*.c", recursive = true }]
include_dirs = ["Core/Inc", "Drivers/CMSIS/Include"]
libs = ["c", "m", "nosys"]

[flash]
programmer = "stm32-programmer"

[debug]
server = "stlink-gdbserver"
chip = "STM32F407VG"
"#;

    #[test]
    fn test_parse_full_manifest() {
        let cfg: FwConfig = toml::from_str(MANIFEST).unwrap();
        assert_eq!(cfg.project.name, "blinky");
        assert_eq!(cfg.project.jobs, Some(4));
        assert_eq!(cfg.toolchain.arch_flags, vec!["-mcpu=cortex-m4", "-mthumb"]);
        assert_eq!(cfg.targets.len(), 1);
        assert!(!cfg.targets[0].sources[0].recursive);
        assert!(cfg.targets[0].sources[1].recursive);
        assert_eq!(
            cfg.configuration["debug"].flags.as_deref(),
            Some(&["-O0".to_string(), "-g3".to_string()][..])
        );
    }

    #[test]
    fn test_flash_and_debug_defaults() {
        let cfg: FwConfig = toml::from_str(MANIFEST).unwrap();
        let flash = cfg.flash.unwrap();
        assert_eq!(flash.programmer, ProgrammerKind::Stm32Programmer);
        assert_eq!(flash.interface, "SWD");
        assert!(flash.reset_after);

        let debug = cfg.debug.unwrap();
        assert_eq!(debug.server, ServerKind::StlinkGdbserver);
        assert_eq!(debug.port, 3333);
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        let bad = "[project]\nname = \"x\"\n[dependencies]\nfoo = \"1\"\n";
        assert!(toml::from_str::<FwConfig>(bad).is_err());
    }
}
