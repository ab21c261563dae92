use std::borrow::Cow;

use crate::traits::command::{BoxedCommand, Command, CommandId};

/// An ordered group of commands undone and redone as one.
///
/// Children are applied as they are added, so a batch records work that has
/// already happened. Undo walks the children in reverse insertion order;
/// redo walks them forward. Children that cannot be undone are stepped over
/// in both directions.
pub struct CommandBatch<C> {
    description: String,
    commands: Vec<BoxedCommand<C>>,
}

impl<C> CommandBatch<C> {
    /// `count_hint` only reserves capacity; any number of commands can be added.
    #[must_use]
    pub fn new(description: impl Into<String>, count_hint: usize) -> Self {
        Self {
            description: description.into(),
            commands: Vec::with_capacity(count_hint),
        }
    }

    /// Takes ownership of `command`, applies it, and appends it.
    pub fn add_and_execute(&mut self, mut command: BoxedCommand<C>, ctx: &mut C) {
        command.execute(ctx);
        self.commands.push(command);
    }

    /// Appends a command whose effect is already applied.
    pub(crate) fn push_executed(&mut self, command: BoxedCommand<C>) {
        self.commands.push(command);
    }

    /// Removes the children matching `id` without undoing them, descending
    /// into nested batches and dropping the ones left empty. Returns the
    /// number of leaf commands removed.
    ///
    /// The caller is responsible for reconciling the effects of the removed
    /// commands.
    pub fn remove_commands(&mut self, id: CommandId) -> usize {
        let mut removed = 0;
        self.commands
            .retain_mut(|command| retain_unmatched(&mut **command, id, &mut removed));
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&dyn Command<Context = C>> {
        self.commands.get(index).map(|command| &**command)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Command<Context = C>> {
        self.commands.iter().map(|command| &**command)
    }
}

/// Decides whether `command` survives removal of `id`. Batches are pruned in
/// place and survive while they still hold children.
pub(crate) fn retain_unmatched<C>(
    command: &mut dyn Command<Context = C>,
    id: CommandId,
    removed: &mut usize,
) -> bool {
    if let Some(batch) = command.as_batch_mut() {
        *removed += batch.remove_commands(id);
        !batch.is_empty()
    } else if command.match_command_id(id) {
        *removed += 1;
        false
    } else {
        true
    }
}

impl<C> Command for CommandBatch<C> {
    type Context = C;

    /// Re-applies every child in insertion order.
    fn execute(&mut self, ctx: &mut C) {
        for command in &mut self.commands {
            if command.can_undo() {
                command.redo(ctx);
            }
        }
    }

    fn undo(&mut self, ctx: &mut C) {
        for command in self.commands.iter_mut().rev() {
            if command.can_undo() {
                command.undo(ctx);
            }
        }
    }

    fn description(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.description)
    }

    fn id(&self) -> CommandId {
        CommandId::BATCH
    }

    fn can_undo(&self) -> bool {
        self.commands.is_empty() || self.commands.iter().any(|command| command.can_undo())
    }

    fn is_clean(&self) -> bool {
        self.commands.iter().all(|command| command.is_clean())
    }

    fn match_command_id(&self, id: CommandId) -> bool {
        id == CommandId::BATCH || self.commands.iter().any(|command| command.match_command_id(id))
    }

    fn as_batch(&self) -> Option<&CommandBatch<C>> {
        Some(self)
    }

    fn as_batch_mut(&mut self) -> Option<&mut CommandBatch<C>> {
        Some(self)
    }
}

impl<C> std::fmt::Debug for CommandBatch<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBatch")
            .field("description", &self.description)
            .field("len", &self.commands.len())
            .finish()
    }
}
