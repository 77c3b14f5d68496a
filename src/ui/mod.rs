//! ui
//!
//! Terminal interaction.
//!
//! - [`prompts`] - Asking the user for credentials, or refusing to when
//!   prompting is disabled
//! - [`output`] - Printing command results
//!
//! The broker only ever talks to a [`prompts::Prompter`], so tests script
//! the answers and the CLI plugs in the terminal.

pub mod output;
pub mod prompts;
