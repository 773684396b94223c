//! Per-user todo list: `/todo_add`, `/todo_list`, `/todo_done`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::commands::{
    CommandContext, CommandExtension, CommandHandler, HelpSink, Registrar, Services,
};
use crate::error::{CommandError, ExtensionError};
use crate::store::{Store, Todo};

pub struct TodoExtension;

impl CommandExtension for TodoExtension {
    fn name(&self) -> &str {
        "todo"
    }

    fn register(
        &self,
        registrar: &mut Registrar,
        services: &Services,
        help: &mut HelpSink,
    ) -> Result<(), ExtensionError> {
        let store = &services.store;
        let list: Arc<dyn CommandHandler> = Arc::new(TodoList {
            store: store.clone(),
        });

        registrar.add("todo_add", Arc::new(TodoAdd {
            store: store.clone(),
        }));
        registrar.add("todo_list", list.clone());
        registrar.add("todo", list);
        registrar.add("todo_done", Arc::new(TodoDone {
            store: store.clone(),
        }));

        help.add("todo_add", "Add a todo: /todo_add <text>");
        help.add("todo_list", "Show open todos (/todo_list all includes done)");
        help.add("todo_done", "Mark a todo done: /todo_done <id>");
        Ok(())
    }
}

struct TodoAdd {
    store: Arc<dyn Store>,
}

#[async_trait]
impl CommandHandler for TodoAdd {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, CommandError> {
        if ctx.args.is_empty() {
            return Err(CommandError::validation("Usage: /todo_add <text>"));
        }
        let id = self.store.add_todo(ctx.owner, &ctx.args).await?;
        tracing::debug!(owner = ctx.owner, todo_id = id, "Todo added");
        Ok(format!("✅ Added todo #{id}"))
    }
}

struct TodoList {
    store: Arc<dyn Store>,
}

#[async_trait]
impl CommandHandler for TodoList {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, CommandError> {
        let include_done = match ctx.args.to_ascii_lowercase().as_str() {
            "" => false,
            "all" => true,
            _ => return Err(CommandError::validation("Usage: /todo_list [all]")),
        };

        let todos = self.store.list_todos(ctx.owner, include_done).await?;
        if todos.is_empty() {
            return Ok("Your todo list is empty. Add one with /todo_add.".to_string());
        }

        let header = if include_done { "Todos:" } else { "Open todos:" };
        let lines: Vec<String> = todos.iter().map(render_todo).collect();
        Ok(format!("{header}\n{}", lines.join("\n")))
    }
}

fn render_todo(todo: &Todo) -> String {
    if todo.done {
        format!("#{} ✓ {}", todo.id, todo.text)
    } else {
        format!("#{} {}", todo.id, todo.text)
    }
}

struct TodoDone {
    store: Arc<dyn Store>,
}

#[async_trait]
impl CommandHandler for TodoDone {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, CommandError> {
        let id: i64 = ctx
            .args
            .trim_start_matches('#')
            .parse()
            .map_err(|_| CommandError::validation("Usage: /todo_done <id>"))?;

        if self.store.complete_todo(ctx.owner, id).await? {
            Ok(format!("🎉 Todo #{id} done!"))
        } else {
            Ok(format!("Todo #{id} not found or already done."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::test_services;
    use crate::commands::{CommandRegistry, Dispatcher};

    async fn setup() -> (Services, Dispatcher) {
        let services = test_services().await;
        let extensions: Vec<Box<dyn CommandExtension>> = vec![Box::new(TodoExtension)];
        let dispatcher = CommandRegistry::load(&extensions, &services).into_dispatcher();
        (services, dispatcher)
    }

    async fn say(dispatcher: &Dispatcher, owner: i64, text: &str) -> String {
        dispatcher.dispatch_text(owner, owner, text).await.unwrap()
    }

    #[tokio::test]
    async fn add_list_and_complete() {
        let (_services, d) = setup().await;

        assert_eq!(say(&d, 1, "/todo_add buy milk").await, "✅ Added todo #1");
        assert_eq!(say(&d, 1, "/todo_add call mom").await, "✅ Added todo #2");
        assert_eq!(
            say(&d, 1, "/todo_list").await,
            "Open todos:\n#1 buy milk\n#2 call mom"
        );

        assert_eq!(say(&d, 1, "/todo_done 1").await, "🎉 Todo #1 done!");
        assert_eq!(say(&d, 1, "/todo").await, "Open todos:\n#2 call mom");
        assert_eq!(
            say(&d, 1, "/todo_list all").await,
            "Todos:\n#2 call mom\n#1 ✓ buy milk"
        );
    }

    #[tokio::test]
    async fn completing_twice_reports_already_done() {
        let (services, d) = setup().await;
        say(&d, 1, "/todo_add water plants").await;

        assert_eq!(say(&d, 1, "/todo_done #1").await, "🎉 Todo #1 done!");
        assert_eq!(
            say(&d, 1, "/todo_done 1").await,
            "Todo #1 not found or already done."
        );

        let todos = services.store.list_todos(1, true).await.unwrap();
        assert_eq!(todos.len(), 1);
        assert!(todos[0].done);
    }

    #[tokio::test]
    async fn todos_are_per_owner() {
        let (_services, d) = setup().await;
        say(&d, 1, "/todo_add mine").await;

        assert_eq!(
            say(&d, 2, "/todo_list").await,
            "Your todo list is empty. Add one with /todo_add."
        );
        assert_eq!(
            say(&d, 2, "/todo_done 1").await,
            "Todo #1 not found or already done."
        );
    }

    #[tokio::test]
    async fn invalid_input_does_not_mutate() {
        let (services, d) = setup().await;

        assert_eq!(say(&d, 1, "/todo_add").await, "Usage: /todo_add <text>");
        assert_eq!(say(&d, 1, "/todo_done abc").await, "Usage: /todo_done <id>");
        assert_eq!(say(&d, 1, "/todo_list later").await, "Usage: /todo_list [all]");
        assert!(services.store.list_todos(1, true).await.unwrap().is_empty());
    }
}
