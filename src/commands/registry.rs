//! Extension loading and the command → handler table.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::commands::dispatcher::Dispatcher;
use crate::commands::handler::{CommandHandler, HelpListing};
use crate::commands::services::Services;
use crate::error::{ExtensionError, panic_message};

/// A unit of commands, registered once at startup.
pub trait CommandExtension: Send + Sync {
    fn name(&self) -> &str;

    /// Add this extension's handlers and help entries.
    ///
    /// An error (or panic) discards everything this extension registered;
    /// other extensions are unaffected.
    fn register(
        &self,
        registrar: &mut Registrar,
        services: &Services,
        help: &mut HelpSink,
    ) -> Result<(), ExtensionError>;
}

/// Collects one extension's command handlers.
#[derive(Default)]
pub struct Registrar {
    handlers: Vec<(String, Arc<dyn CommandHandler>)>,
}

impl Registrar {
    /// Route `command` (with or without the leading `/`) to `handler`.
    pub fn add(&mut self, command: &str, handler: Arc<dyn CommandHandler>) {
        self.handlers.push((normalize_command(command), handler));
    }
}

/// Collects one extension's help entries.
#[derive(Default)]
pub struct HelpSink {
    entries: Vec<(String, String)>,
}

impl HelpSink {
    pub fn add(&mut self, command: &str, help: &str) {
        self.entries
            .push((normalize_command(command), help.trim().to_string()));
    }
}

/// Which extensions loaded, and why the others did not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The merged command table built from all extensions that loaded.
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    help: BTreeMap<String, String>,
    report: LoadReport,
}

impl CommandRegistry {
    /// Register every extension in order.
    ///
    /// Each extension writes into its own staging registrar and help sink,
    /// merged only when `register` returns `Ok`. A command registered twice
    /// keeps the last handler and logs a warning.
    pub fn load(extensions: &[Box<dyn CommandExtension>], services: &Services) -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
            help: BTreeMap::new(),
            report: LoadReport::default(),
        };

        for extension in extensions {
            let name = extension.name().to_string();
            let mut staging = Registrar::default();
            let mut help = HelpSink::default();

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                extension.register(&mut staging, services, &mut help)
            }))
            .unwrap_or_else(|panic| {
                Err(ExtensionError::Panicked {
                    name: name.clone(),
                    message: panic_message(panic.as_ref()),
                })
            });

            match outcome {
                Ok(()) => {
                    let commands = staging.handlers.len();
                    registry.merge(&name, staging, help);
                    tracing::info!(extension = %name, commands, "Extension loaded");
                    registry.report.loaded.push(name);
                }
                Err(e) => {
                    tracing::error!(extension = %name, error = %e, "Extension failed to load");
                    registry.report.failed.push((name, e.to_string()));
                }
            }
        }

        tracing::info!(
            loaded = registry.report.loaded.len(),
            failed = registry.report.failed.len(),
            commands = registry.handlers.len(),
            "Command registry ready"
        );
        registry
    }

    fn merge(&mut self, extension: &str, staging: Registrar, help: HelpSink) {
        for (command, handler) in staging.handlers {
            if !is_valid_command(&command) {
                tracing::warn!(extension, command = %command, "Ignoring invalid command name");
                continue;
            }
            if self.handlers.insert(command.clone(), handler).is_some() {
                tracing::warn!(
                    extension,
                    command = %command,
                    "Command registered twice; last registration wins"
                );
            }
        }
        for (command, text) in help.entries {
            if is_valid_command(&command) {
                self.help.insert(command, text);
            }
        }
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn contains(&self, command: &str) -> bool {
        self.handlers.contains_key(&normalize_command(command))
    }

    /// Number of registered command names.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn help_listing(&self) -> HelpListing {
        HelpListing::new(self.help.clone())
    }

    pub fn into_dispatcher(self) -> Dispatcher {
        let help = Arc::new(HelpListing::new(self.help));
        Dispatcher::new(self.handlers, help)
    }
}

fn is_valid_command(command: &str) -> bool {
    !command.is_empty() && !command.contains(char::is_whitespace) && !command.contains('@')
}

fn normalize_command(command: &str) -> String {
    command.trim().trim_start_matches('/').to_ascii_lowercase()
}
