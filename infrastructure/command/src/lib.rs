//! Commands to interact with backend tools
//!
//! A [`Pipeline`] runs one tool, or an exporting tool piped into an importing
//! one the way `export | import` does in a shell.

mod exception;
mod pipeline;

#[rustfmt::skip]
pub use {
    exception::{CommandException, CommandResult},
    pipeline::{Pipeline, PipelineOutput, Stage, StageInput, StageOutput},
};
