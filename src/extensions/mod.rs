//! Built-in command extensions, registered in this order at startup.

mod general;
mod reminders;
mod todo;
mod utility;

pub use general::GeneralExtension;
pub use reminders::RemindersExtension;
pub use todo::TodoExtension;
pub use utility::UtilityExtension;

use crate::commands::CommandExtension;

/// The static extension list. Later entries win command-name collisions.
pub fn builtin_extensions() -> Vec<Box<dyn CommandExtension>> {
    vec![
        Box::new(GeneralExtension),
        Box::new(TodoExtension),
        Box::new(RemindersExtension),
        Box::new(UtilityExtension),
    ]
}
