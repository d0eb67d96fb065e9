//! Command registry: name -> command function.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::context::CommandContext;

pub type CommandFuture = Pin<Box<dyn Future<Output = i32> + Send>>;
pub type CommandFn = Arc<dyn Fn(CommandContext) -> CommandFuture + Send + Sync>;

/// Maps a command name to its implementation. Later registrations of the
/// same name override earlier ones, matching the teacher's skill-registry
/// override semantics.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CommandFn>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = i32> + Send + 'static,
    {
        self.commands
            .insert(name.into(), Arc::new(move |ctx| Box::pin(f(ctx))));
    }

    pub fn get(&self, name: &str) -> Option<CommandFn> {
        self.commands.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn later_registration_overrides_earlier() {
        let mut reg = CommandRegistry::new();
        reg.register("greet", |_ctx| async { 1 });
        reg.register("greet", |_ctx| async { 0 });
        assert!(reg.contains("greet"));
    }
}
