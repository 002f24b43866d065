use criterion::{Criterion, criterion_group, criterion_main};
use fwforge::analyze::{SizeReport, parse_memory_regions, region_usage, sections};
use fwforge::config::FwConfig;
use fwforge::sources::{MemoryFs, SourceResolver, SourceRoot};
use std::hint::black_box;
use std::path::PathBuf;

const LINKER_SCRIPT: &str = r#"
/* Highest address of the user mode stack */
_estack = ORIGIN(RAM) + LENGTH(RAM);
_Min_Heap_Size = 0x200;
_Min_Stack_Size = 0x400;

MEMORY
{
  CCMRAM    (xrw)    : ORIGIN = 0x10000000,   LENGTH = 64K
  RAM    (xrw)    : ORIGIN = 0x20000000,   LENGTH = 128K
  FLASH    (rx)    : ORIGIN = 0x8000000,   LENGTH = 1024K
}

SECTIONS
{
  .isr_vector : { KEEP(*(.isr_vector)) } >FLASH
  .text : { *(.text) *(.text*) } >FLASH
}
"#;

const SIZE_A: &str = "\
blinky.elf  :
section               size        addr
.isr_vector            392   134217728
.text                 9216   134218120
.rodata                 36   134227336
.ARM                     8   134227372
.init_array              4   134227380
.fini_array              4   134227384
.data                   12   536870912
.bss                  1580   536870924
._user_heap_stack     1536   536872504
.ARM.attributes         48           0
.comment                67           0
.debug_info          40000           0
Total                52903
";

const MANIFEST: &str = r#"
[project]
name = "bench"

[toolchain]
cc = "arm-none-eabi-gcc"
cxx = "arm-none-eabi-g++"
asm = "arm-none-eabi-gcc"
objcopy = "arm-none-eabi-objcopy"
size = "arm-none-eabi-size"
arch_flags = ["-mcpu=cortex-m4", "-mthumb"]
linker_script = "STM32F407VGTx_FLASH.ld"

[[target]]
name = "firmware"
sources = [{ pattern = "Core/Src/*.c" }, { pattern = "Drivers", recursive = true }]
"#;

fn vendor_tree() -> MemoryFs {
    let mut fs = MemoryFs::new();
    for i in (0..200).rev() {
        fs.add_file(format!("Drivers/STM32F4xx_HAL_Driver/Src/stm32f4xx_hal_{:03}.c", i));
        fs.add_file(format!("Drivers/STM32F4xx_HAL_Driver/Inc/stm32f4xx_hal_{:03}.h", i));
    }
    for name in ["main.c", "gpio.c", "usart.c", "stm32f4xx_it.c", "syscalls.c"] {
        fs.add_file(format!("Core/Src/{}", name));
    }
    fs
}

fn bench_linker_script(c: &mut Criterion) {
    c.bench_function("parse_memory_regions", |b| {
        b.iter(|| parse_memory_regions(black_box(LINKER_SCRIPT)).unwrap())
    });
}

fn bench_size_analysis(c: &mut Criterion) {
    let regions = parse_memory_regions(LINKER_SCRIPT).unwrap();
    c.bench_function("size_report_and_usage", |b| {
        b.iter(|| {
            let raw = sections::parse_size_output(black_box(SIZE_A)).unwrap();
            let report = SizeReport::from_sections(raw, &regions);
            region_usage(&report, &regions)
        })
    });
}

fn bench_manifest_parse(c: &mut Criterion) {
    c.bench_function("parse_fw_toml", |b| {
        b.iter(|| {
            let _: FwConfig = toml::from_str(black_box(MANIFEST)).unwrap();
        })
    });
}

fn bench_source_resolution(c: &mut Criterion) {
    let fs = vendor_tree();
    let roots = vec![
        SourceRoot::new("Core/Src/*.c", false),
        SourceRoot::new("Drivers", true),
    ];
    let include_dirs = vec![PathBuf::from("Core/Inc")];
    c.bench_function("resolve_vendor_tree", |b| {
        b.iter(|| {
            SourceResolver::new(&fs)
                .resolve("firmware", black_box(&roots), &include_dirs)
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_linker_script,
    bench_size_analysis,
    bench_manifest_parse,
    bench_source_resolution
);
criterion_main!(benches);
