use std::borrow::Cow;

use crate::error::Result;

use super::command::BoxedCommand;

/// The undo/redo surface shared by a single [`CommandStack`](crate::command_stack::CommandStack)
/// and a [`CommandStackGroup`](crate::command_stack_group::CommandStackGroup) routing to its active stack.
pub trait CommandHistory<C> {
    /// Applies `command` and records it.
    ///
    /// # Errors
    ///
    /// Fails when there is no stack to record into.
    fn exec(&mut self, command: BoxedCommand<C>, ctx: &mut C) -> Result<()>;
    fn undo(&mut self, ctx: &mut C);
    fn redo(&mut self, ctx: &mut C);
    fn can_undo(&self) -> bool;
    fn can_redo(&self) -> bool;
    fn undo_text(&self) -> Option<Cow<'_, str>>;
    fn redo_text(&self) -> Option<Cow<'_, str>>;

    /// Opens a batch: commands executed until the matching `end_batch` become
    /// one history entry.
    ///
    /// # Errors
    ///
    /// Fails when there is no stack to open the batch on.
    fn begin_batch(&mut self, description: &str, count_hint: usize) -> Result<()>;

    /// # Errors
    ///
    /// Fails when no batch is open.
    fn end_batch(&mut self) -> Result<()>;

    /// Executes `commands` as one batch labelled `description`.
    ///
    /// # Errors
    ///
    /// Propagates the first error from `begin_batch`, `exec` or `end_batch`.
    fn batch_execute(
        &mut self,
        description: &str,
        commands: Vec<BoxedCommand<C>>,
        ctx: &mut C,
    ) -> Result<()> {
        self.begin_batch(description, commands.len())?;
        for command in commands {
            self.exec(command, ctx)?;
        }
        self.end_batch()
    }
}
