//! Build orchestration.
//!
//! [`Orchestrator`] moves each (target, configuration) pair through
//! `Unconfigured -> Configured -> Built -> Analyzed`, or to `Failed` when a
//! compile, link or post-build step fails. A failed build never leaves an
//! artifact behind.

mod clean;
mod compile;
pub mod diagnostics;
mod link;
mod orchestrator;
mod scripts;

pub use clean::{CleanScope, clean};
pub use compile::{CompileUnit, object_path};
pub use link::LinkOutputs;
pub use orchestrator::{Artifact, BuildOutcome, BuildState, ConfigureOutcome, Orchestrator};
pub use scripts::run_script;
