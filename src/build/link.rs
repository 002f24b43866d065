use crate::error::{Error, Result, Stage};
use crate::process::{Invocation, ProcessRunner};
use crate::registry::BuildTarget;
use crate::toolchain::{ResolvedFlags, SourceKind, ToolchainProfile};
use std::path::{Path, PathBuf};

/// Files written next to the `.elf` by the link and post-build steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutputs {
    pub elf: PathBuf,
    pub map: PathBuf,
    pub hex: PathBuf,
    pub bin: PathBuf,
}

impl LinkOutputs {
    pub fn for_artifact(elf: PathBuf) -> Self {
        Self {
            map: elf.with_extension("map"),
            hex: elf.with_extension("hex"),
            bin: elf.with_extension("bin"),
            elf,
        }
    }
}

/// `-lfoo` for plain names; flags and paths pass through untouched.
fn lib_arg(lib: &str) -> String {
    if lib.starts_with('-') || lib.contains('/') || lib.ends_with(".a") {
        lib.to_string()
    } else {
        format!("-l{}", lib)
    }
}

/// C++ objects need the C++ driver for its runtime; otherwise link with cc.
fn linker_driver<'p>(profile: &'p ToolchainProfile, target: &BuildTarget) -> Result<&'p str> {
    let has_cpp = target
        .source_set
        .files()
        .iter()
        .any(|f| SourceKind::from_path(f) == Some(SourceKind::Cpp));
    let kind = if has_cpp { SourceKind::Cpp } else { SourceKind::C };
    profile
        .compiler_for(kind)
        .ok_or_else(|| Error::config("no linker driver configured"))
}

/// Link command. Objects are sorted so the image layout never depends on
/// the order compilation finished in.
pub fn link_invocation(
    profile: &ToolchainProfile,
    flags: &ResolvedFlags,
    target: &BuildTarget,
    objects: &[PathBuf],
    outputs: &LinkOutputs,
    project_dir: &Path,
) -> Result<Invocation> {
    let script = profile
        .linker_script
        .as_ref()
        .ok_or_else(|| Error::config("toolchain linker_script not set"))?;
    let mut objects = objects.to_vec();
    objects.sort();

    let mut inv = Invocation::new(linker_driver(profile, target)?)
        .args(flags.link_args())
        .arg(format!("-T{}", script.display()));
    for obj in &objects {
        inv = inv.path_arg(obj);
    }
    Ok(inv
        .arg(format!("-Wl,-Map={}", outputs.map.display()))
        .arg("-o")
        .path_arg(&outputs.elf)
        .args(target.extra_link_libs.iter().map(|l| lib_arg(l)))
        .current_dir(project_dir))
}

pub fn link(runner: &dyn ProcessRunner, invocation: &Invocation) -> Result<()> {
    let out = runner.run(invocation).map_err(|source| Error::Tool {
        stage: Stage::Link,
        program: invocation.program.clone(),
        source,
    })?;
    if !out.success() {
        return Err(Error::Link {
            exit_code: out.code,
            stderr: out.combined(),
        });
    }
    Ok(())
}

/// Produces the `.hex` and `.bin` images from the linked `.elf`.
pub fn objcopy_images(
    runner: &dyn ProcessRunner,
    objcopy: &str,
    outputs: &LinkOutputs,
    project_dir: &Path,
) -> Result<()> {
    for (format, image) in [("ihex", &outputs.hex), ("binary", &outputs.bin)] {
        let inv = Invocation::new(objcopy)
            .args(["-O", format])
            .path_arg(&outputs.elf)
            .path_arg(image)
            .current_dir(project_dir);
        let out = runner.run(&inv).map_err(|source| Error::Tool {
            stage: Stage::PostBuild,
            program: objcopy.to_string(),
            source,
        })?;
        if !out.success() {
            return Err(Error::PostBuild {
                step: format!("objcopy -O {}", format),
                exit_code: out.code,
                output: out.combined(),
            });
        }
    }
    Ok(())
}
