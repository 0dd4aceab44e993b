//! Application-level orchestration.
//!
//! `controller` executes remote requests on behalf of the interactive UI and reports the
//! results as events. `scripted` runs the same state machines to completion for the
//! one-shot subcommands.

mod controller;
pub(crate) mod scripted;

pub(crate) use controller::{run_controller, UiCommand};
