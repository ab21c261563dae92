use std::{borrow::Cow, fmt};

use crate::command_batch::CommandBatch;

/// Category identifier used to filter and remove commands without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u32);

impl CommandId {
    /// Reported by commands that do not declare a category.
    pub const UNDEFINED: CommandId = CommandId(0);
    /// Reported by every [`CommandBatch`].
    pub const BATCH: CommandId = CommandId(u32::MAX);
}

impl Default for CommandId {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An owned, type-erased command as stored by batches and stacks.
pub type BoxedCommand<C> = Box<dyn Command<Context = C>>;

/// A trait representing a command that can be executed, undone, and redone within a given context.
///
/// The context is passed in on every call, so a command only keeps what it
/// needs to find its target again (an id, a path) and never a pointer into the
/// document itself.
///
/// # Associated Types
///
/// * `Context`: The type of the context in which the command operates.
///
/// # Required Methods
///
/// * `execute(&mut self, ctx: &mut Self::Context)`: Applies the command for the first time.
/// * `undo(&mut self, ctx: &mut Self::Context)`: Reverts the command.
///
/// # Provided Methods
///
/// * `redo`: Re-applies the command by calling `execute`.
/// * `description`: Text shown in "Undo ..." / "Redo ..." labels. Defaults to "Unknown command".
/// * `id`: Category used by [`match_command_id`](Command::match_command_id). Defaults to [`CommandId::UNDEFINED`].
/// * `can_undo`: Whether the command can be reverted. Defaults to `true`.
/// * `is_clean`: Whether the command leaves the saved document untouched. Defaults to `false`.
///
/// # Example
///
/// ```
/// use command_stack::prelude::*;
/// use std::borrow::Cow;
///
/// struct Rename {
///     name: String,
///     previous: Option<String>,
/// }
///
/// impl Command for Rename {
///     type Context = String;
///
///     fn execute(&mut self, ctx: &mut Self::Context) {
///         self.previous = Some(std::mem::replace(ctx, self.name.clone()));
///     }
///
///     fn undo(&mut self, ctx: &mut Self::Context) {
///         if let Some(previous) = &self.previous {
///             ctx.clone_from(previous);
///         }
///     }
///
///     fn description(&self) -> Cow<'_, str> {
///         Cow::Owned(format!("Rename to {}", self.name))
///     }
/// }
///
/// let mut doc = String::from("a");
/// let mut cmd = Rename { name: "b".into(), previous: None };
/// cmd.execute(&mut doc);
/// assert_eq!(doc, "b");
/// cmd.undo(&mut doc);
/// assert_eq!(doc, "a");
/// ```
pub trait Command: Send {
    type Context;

    /// Applies the command for the first time.
    ///
    /// # Arguments
    ///
    /// * `ctx`: A mutable reference to the context in which the command operates.
    fn execute(&mut self, ctx: &mut Self::Context);

    /// Reverts the effect of `execute` or `redo`.
    ///
    /// # Arguments
    ///
    /// * `ctx`: A mutable reference to the context in which the command operates.
    fn undo(&mut self, ctx: &mut Self::Context);

    /// Re-applies the command after an undo by calling `execute`. This method can be overridden if needed.
    fn redo(&mut self, ctx: &mut Self::Context) {
        self.execute(ctx);
    }

    /// Returns a description of the command. The default implementation returns "Unknown command".
    fn description(&self) -> Cow<'_, str> {
        Cow::Borrowed("Unknown command")
    }

    fn id(&self) -> CommandId {
        CommandId::UNDEFINED
    }

    /// Commands returning `false` stay in the history, but stacks and batches
    /// step over them without calling `undo` or `redo`.
    fn can_undo(&self) -> bool {
        true
    }

    /// A clean command does not modify the saved document, so it never makes
    /// the owning stack dirty.
    fn is_clean(&self) -> bool {
        false
    }

    fn match_command_id(&self, id: CommandId) -> bool {
        self.id() == id
    }

    fn match_command_ids(&self, ids: &[CommandId]) -> bool {
        ids.iter().any(|id| self.match_command_id(*id))
    }

    /// Gives access to the children of a batch. Leaf commands return `None`.
    fn as_batch(&self) -> Option<&CommandBatch<Self::Context>> {
        None
    }

    fn as_batch_mut(&mut self) -> Option<&mut CommandBatch<Self::Context>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Add(i32);

    impl Command for Add {
        type Context = i32;

        fn execute(&mut self, ctx: &mut i32) {
            *ctx += self.0;
        }

        fn undo(&mut self, ctx: &mut i32) {
            *ctx -= self.0;
        }
    }

    struct Tagged(CommandId);

    impl Command for Tagged {
        type Context = ();

        fn execute(&mut self, _ctx: &mut ()) {}

        fn undo(&mut self, _ctx: &mut ()) {}

        fn id(&self) -> CommandId {
            self.0
        }
    }

    #[test]
    fn test_defaults() {
        let mut cmd = Add(2);
        let mut ctx = 0;

        cmd.execute(&mut ctx);
        cmd.undo(&mut ctx);
        cmd.redo(&mut ctx);

        assert_eq!(ctx, 2);
        assert_eq!(cmd.description(), "Unknown command");
        assert_eq!(cmd.id(), CommandId::UNDEFINED);
        assert!(cmd.can_undo());
        assert!(!cmd.is_clean());
        assert!(cmd.as_batch().is_none());
    }

    #[test]
    fn test_match_command_ids() {
        let cmd = Tagged(CommandId(4));

        assert!(cmd.match_command_id(CommandId(4)));
        assert!(!cmd.match_command_id(CommandId(5)));
        assert!(cmd.match_command_ids(&[CommandId(1), CommandId(4)]));
        assert!(!cmd.match_command_ids(&[]));
    }

    #[test]
    fn test_boxed_command() {
        let mut cmd: BoxedCommand<i32> = Box::new(Add(5));
        let mut ctx = 1;

        cmd.execute(&mut ctx);
        assert_eq!(ctx, 6);
        cmd.undo(&mut ctx);
        assert_eq!(ctx, 1);
    }
}
