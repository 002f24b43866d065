//! Shared fixtures: a temporary firmware project and a scripted toolchain
//! that writes outputs without a cross compiler installed.

#![allow(dead_code)]

use fwforge::config::FwConfig;
use fwforge::process::{Invocation, ProcessOutput, ProcessRunner, RunningProcess};
use fwforge::project::Project;
use fwforge::sources::MemoryFs;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const LINKER_SCRIPT: &str = "\
/* Entry Point */
ENTRY(Reset_Handler)

MEMORY
{
  RAM    (xrw)    : ORIGIN = 0x20000000,   LENGTH = 8K
  FLASH    (rx)    : ORIGIN = 0x08000000,   LENGTH = 64K
}
";

pub const MANIFEST: &str = r#"
[project]
name = "blinky"
jobs = 2

[toolchain]
cc = "arm-none-eabi-gcc"
cxx = "arm-none-eabi-g++"
asm = "arm-none-eabi-gcc"
objcopy = "arm-none-eabi-objcopy"
size = "arm-none-eabi-size"
nm = "arm-none-eabi-nm"
arch_flags = ["-mcpu=cortex-m4", "-mthumb", "-mfloat-abi=hard", "-mfpu=fpv4-sp-d16"]
linker_script = "STM32F401RETx_FLASH.ld"
defines = ["USE_HAL_DRIVER", "STM32F401xE"]

[[target]]
name = "firmware"
output = "blinky"
sources = [
    { pattern = "Core/Src/*.c" },
    { pattern = "Core/Startup/*.s" },
    { pattern = "Drivers", recursive = true },
]
include_dirs = ["Core/Inc", "Drivers/CMSIS/Include"]
libs = ["c", "m", "nosys"]

[[target]]
name = "tests"
sources = [{ pattern = "Tests/*.c" }, { pattern = "Core/Startup/*.s" }]
include_dirs = ["Core/Inc"]

[flash]
programmer = "openocd"
config_files = ["interface/stlink.cfg", "target/stm32f4x.cfg"]

[debug]
adapter = "stlink"
chip = "STM32F401RE"
"#;

pub const VENDOR_FILES: &[&str] = &[
    "Core/Src/main.c",
    "Core/Src/gpio.c",
    "Core/Src/stm32f4xx_it.c",
    "Core/Src/system_stm32f4xx.c",
    "Core/Startup/startup_stm32f401retx.s",
    "Drivers/STM32F4xx_HAL_Driver/Src/stm32f4xx_hal.c",
    "Drivers/STM32F4xx_HAL_Driver/Src/stm32f4xx_hal_gpio.c",
    "Drivers/STM32F4xx_HAL_Driver/Src/stm32f4xx_hal_rcc.c",
    "Drivers/CMSIS/Include/core_cm4.h",
    "Tests/test_main.c",
];

/// A project root on disk holding the linker script; sources are listed
/// from memory in the given order.
pub struct Fixture {
    pub dir: TempDir,
    pub project: Project,
}

pub fn fixture() -> Fixture {
    fixture_with(MANIFEST, VENDOR_FILES)
}

pub fn fixture_with(manifest: &str, files: &[&str]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("STM32F401RETx_FLASH.ld"), LINKER_SCRIPT).unwrap();
    let project = project_in(dir.path(), manifest, files);
    Fixture { dir, project }
}

pub fn project_in(root: &Path, manifest: &str, files: &[&str]) -> Project {
    let config: FwConfig = toml::from_str(manifest).unwrap();
    let mut tree = MemoryFs::new();
    for f in files {
        tree.add_file(*f);
    }
    Project::from_config(root, &config, &tree).unwrap()
}

/// `size -A -d` for an image that fits the fixture's memory map.
pub const SIZE_FITS: &str = "\
blinky.elf  :
section               size        addr
.isr_vector            452   134217728
.text                 6100   134218180
.rodata                 64   134224280
.data                   12   536870912
.bss                  1700   536870924
._user_heap_stack     1536   536872624
.ARM.attributes         48           0
.comment                67           0
Total                 9979
";

/// Same image with a `.bss` that no longer fits in 8K of RAM.
pub const SIZE_RAM_OVERFLOW: &str = "\
blinky.elf  :
section               size        addr
.isr_vector            452   134217728
.text                 6100   134218180
.data                   12   536870912
.bss                  9000   536870924
Total                15564
";

pub const NM_OUTPUT: &str = "\
536870924 00001024 B rx_buffer
134218300 00000512 T HAL_RCC_OscConfig
134218900 00000128 T main
134217728 00000452 R g_pfnVectors
";

/// Scripted cross toolchain. Every invocation is recorded; compilers and
/// the linker write small deterministic files to their `-o` argument.
pub struct FakeToolchain {
    pub calls: Mutex<Vec<Invocation>>,
    /// Source file name -> compiler stderr for units that should fail.
    pub compile_errors: BTreeMap<String, String>,
    pub link_error: Option<String>,
    pub size_output: String,
    pub programmer_exit: i32,
}

impl Default for FakeToolchain {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            compile_errors: BTreeMap::new(),
            link_error: None,
            size_output: SIZE_FITS.to_string(),
            programmer_exit: 0,
        }
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn ok(stdout: &str) -> ProcessOutput {
    ProcessOutput {
        code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn failed(code: i32, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

impl FakeToolchain {
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }

    /// Compiler invocations, identified by `-c`.
    pub fn compile_calls(&self) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.program.starts_with("arm-none-eabi-g"))
            .filter(|c| c.args.iter().any(|a| a == "-c"))
            .collect()
    }

    pub fn link_calls(&self) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.args.iter().any(|a| a.starts_with("-Wl,-Map=")))
            .collect()
    }

    fn compile(&self, inv: &Invocation) -> io::Result<ProcessOutput> {
        let source = value_after(&inv.args, "-c").unwrap_or_default();
        let name = Path::new(source)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if let Some(stderr) = self.compile_errors.get(name) {
            return Ok(failed(1, stderr));
        }
        if let Some(object) = value_after(&inv.args, "-o") {
            fs::write(object, format!("OBJ {}\n", source))?;
        }
        Ok(ok(""))
    }

    fn link(&self, inv: &Invocation) -> io::Result<ProcessOutput> {
        if let Some(stderr) = &self.link_error {
            return Ok(failed(1, stderr));
        }
        let mut image = String::from("ELF\n");
        for object in inv.args.iter().filter(|a| a.ends_with(".o")) {
            image.push_str(&fs::read_to_string(object)?);
        }
        if let Some(elf) = value_after(&inv.args, "-o") {
            fs::write(elf, image)?;
        }
        Ok(ok(""))
    }
}

impl ProcessRunner for FakeToolchain {
    fn run(&self, inv: &Invocation) -> io::Result<ProcessOutput> {
        self.calls.lock().unwrap().push(inv.clone());
        match inv.program.as_str() {
            "arm-none-eabi-size" => Ok(ok(&self.size_output)),
            "arm-none-eabi-nm" => Ok(ok(NM_OUTPUT)),
            "arm-none-eabi-objcopy" => {
                let elf = &inv.args[inv.args.len() - 2];
                let image = &inv.args[inv.args.len() - 1];
                fs::copy(elf, image)?;
                Ok(ok(""))
            }
            "openocd" if self.programmer_exit != 0 => Ok(failed(
                self.programmer_exit,
                "Error: open failed\nin procedure 'program'",
            )),
            "openocd" => Ok(ok("** Programming Finished **\n** Verified OK **")),
            _ if inv.args.iter().any(|a| a.starts_with("-Wl,-Map=")) => self.link(inv),
            _ if inv.args.iter().any(|a| a == "-c") => self.compile(inv),
            other => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not scripted", other),
            )),
        }
    }

    fn spawn(&self, inv: &Invocation) -> io::Result<Box<dyn RunningProcess>> {
        self.calls.lock().unwrap().push(inv.clone());
        Ok(Box::new(FakeProcess::default()))
    }
}

/// A process that runs until terminated.
#[derive(Debug, Default, Clone)]
pub struct FakeProcess {
    pub stopped: Arc<AtomicBool>,
}

impl RunningProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.stopped.load(Ordering::SeqCst).then_some(0))
    }

    fn wait(&mut self) -> io::Result<i32> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(0)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}
