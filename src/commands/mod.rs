//! Command registry, dispatch, and argument parsing.

pub mod dispatcher;
pub mod handler;
pub mod parse;
pub mod registry;
pub mod services;

pub use dispatcher::{Dispatcher, GENERIC_FAILURE_REPLY, parse_command};
pub use handler::{CommandContext, CommandHandler, HelpListing};
pub use registry::{CommandExtension, CommandRegistry, HelpSink, LoadReport, Registrar};
pub use services::Services;
