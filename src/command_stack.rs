use std::{borrow::Cow, fmt, num::NonZeroUsize};

use tracing::{debug, warn};

use crate::{
    command_batch::{retain_unmatched, CommandBatch},
    config::StackConfig,
    error::{Result, StackError},
    traits::{
        command::{BoxedCommand, Command, CommandId},
        command_history::CommandHistory,
        stack_observer::{notify_diff, StackObserver, StackState},
    },
};

/// Linear undo/redo history of one document.
///
/// Entries before the cursor are done, entries from the cursor on are undone
/// and available for redo. Executing a new command discards every undone
/// entry.
///
/// ```
/// use command_stack::prelude::*;
///
/// struct Add(i32);
///
/// impl Command for Add {
///     type Context = i32;
///     fn execute(&mut self, ctx: &mut i32) { *ctx += self.0; }
///     fn undo(&mut self, ctx: &mut i32) { *ctx -= self.0; }
/// }
///
/// let mut stack = CommandStack::new();
/// let mut value = 0;
///
/// stack.exec(Box::new(Add(2)), &mut value).unwrap();
/// stack.exec(Box::new(Add(3)), &mut value).unwrap();
/// stack.undo(&mut value);
/// assert_eq!(value, 2);
/// assert!(stack.can_redo());
/// ```
pub struct CommandStack<C> {
    history: Vec<BoxedCommand<C>>,
    cursor: usize,
    clean_index: Option<usize>,
    changed: bool,
    history_limit: Option<NonZeroUsize>,
    batch_capacity_hint: usize,
    open_batches: Vec<CommandBatch<C>>,
    observer: Option<Box<dyn StackObserver>>,
}

impl<C: 'static> Default for CommandStack<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> CommandStack<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&StackConfig::default())
    }

    #[must_use]
    pub fn with_config(config: &StackConfig) -> Self {
        Self {
            history: Vec::new(),
            cursor: 0,
            clean_index: Some(0),
            changed: false,
            history_limit: config.history_limit,
            batch_capacity_hint: config.batch_capacity_hint,
            open_batches: Vec::new(),
            observer: None,
        }
    }

    pub fn set_observer<O>(&mut self, observer: O)
    where
        O: StackObserver + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    pub fn take_observer(&mut self) -> Option<Box<dyn StackObserver>> {
        self.observer.take()
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&dyn Command<Context = C>> {
        self.history.get(index).map(|command| &**command)
    }

    /// All entries, oldest first, done and undone alike.
    pub fn history(&self) -> impl Iterator<Item = &dyn Command<Context = C>> {
        self.history.iter().map(|command| &**command)
    }

    /// The entry the next `undo` would revert.
    #[must_use]
    pub fn undo_command(&self) -> Option<&dyn Command<Context = C>> {
        self.cursor.checked_sub(1).and_then(|index| self.get(index))
    }

    /// The entry the next `redo` would re-apply.
    #[must_use]
    pub fn redo_command(&self) -> Option<&dyn Command<Context = C>> {
        self.get(self.cursor)
    }

    #[must_use]
    pub fn is_batch_open(&self) -> bool {
        !self.open_batches.is_empty()
    }

    /// Whether the document matches its last saved state.
    ///
    /// Clean commands between the save point and the cursor do not count.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        if self.changed {
            return false;
        }
        self.clean_index.is_some_and(|clean| {
            let (from, to) = ordered(clean, self.cursor);
            self.history[from..to].iter().all(|command| command.is_clean())
        })
    }

    /// Marks the current position as saved.
    pub fn set_clean(&mut self) {
        self.notifying(|stack| {
            stack.clean_index = Some(stack.cursor);
            stack.changed = false;
        });
    }

    /// Marks the document as modified by something outside the history.
    pub fn set_changed(&mut self) {
        self.notifying(|stack| stack.changed = true);
    }

    /// Whether a command matching `id` is part of the unsaved changes,
    /// including commands in a batch that is still open.
    #[must_use]
    pub fn is_unclean_command_exists(&self, id: CommandId) -> bool {
        let (from, to) = match self.clean_index {
            Some(clean) => ordered(clean, self.cursor),
            None => (0, self.cursor),
        };
        self.history[from..to]
            .iter()
            .any(|command| command.match_command_id(id))
            || self.open_batches.iter().any(|batch| batch.match_command_id(id))
    }

    /// Removes every command matching `id`, inside batches too, without
    /// undoing it. The cursor and the save point keep pointing at the same
    /// surviving entries. Returns the number of commands removed.
    ///
    /// The caller is responsible for reconciling the effects of the removed
    /// commands.
    pub fn remove_commands(&mut self, id: CommandId) -> usize {
        self.notifying(|stack| {
            let mut removed = 0;
            for batch in &mut stack.open_batches {
                removed += batch.remove_commands(id);
            }

            let (cursor, clean_index) = (stack.cursor, stack.clean_index);
            let (mut before_cursor, mut before_clean) = (0, 0);
            let mut index = 0;
            stack.history.retain_mut(|command| {
                let keep = retain_unmatched(&mut **command, id, &mut removed);
                if !keep {
                    before_cursor += usize::from(index < cursor);
                    before_clean += usize::from(clean_index.is_some_and(|clean| index < clean));
                }
                index += 1;
                keep
            });
            stack.cursor -= before_cursor;
            stack.clean_index = clean_index.map(|clean| clean - before_clean);

            debug!(%id, removed, cursor = stack.cursor, len = stack.history.len(), "removed commands");
            removed
        })
    }

    /// Drops every entry and any open batch. A clean stack stays clean, a
    /// modified one stays modified.
    pub fn clear(&mut self) {
        self.notifying(|stack| {
            let was_clean = stack.is_clean();
            stack.history.clear();
            stack.open_batches.clear();
            stack.cursor = 0;
            stack.clean_index = was_clean.then_some(0);
            debug!("cleared command stack");
        });
    }

    #[must_use]
    pub fn history_limit(&self) -> Option<NonZeroUsize> {
        self.history_limit
    }

    /// Bounds the number of undoable entries and, separately, of redoable
    /// entries. The oldest entries go first.
    pub fn set_history_limit(&mut self, limit: NonZeroUsize) {
        self.notifying(|stack| {
            stack.history_limit = Some(limit);
            stack.apply_history_limit();
        });
    }

    #[must_use]
    pub fn state(&self) -> StackState {
        StackState {
            clean: self.is_clean(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            undo_text: self.undo_text().map(Cow::into_owned),
            redo_text: self.redo_text().map(Cow::into_owned),
        }
    }

    fn notifying<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        if self.observer.is_none() {
            return f(self);
        }
        let before = self.state();
        let result = f(self);
        let after = self.state();
        notify_diff(self.observer.as_mut(), &before, &after);
        result
    }

    /// Records a command whose effect is already applied.
    fn push_executed(&mut self, command: BoxedCommand<C>) {
        if self.cursor < self.history.len() {
            if self.clean_index.is_some_and(|clean| clean > self.cursor) {
                self.clean_index = None;
            }
            self.history.truncate(self.cursor);
        }

        self.history.push(command);
        self.cursor += 1;
        self.apply_history_limit();
    }

    fn apply_history_limit(&mut self) {
        let Some(limit) = self.history_limit.map(NonZeroUsize::get) else {
            return;
        };

        if self.cursor > limit {
            let excess = self.cursor - limit;
            self.history.drain(..excess);
            self.cursor = limit;
            self.clean_index = self.clean_index.and_then(|clean| clean.checked_sub(excess));
        }

        if self.history.len() - self.cursor > limit {
            self.history.truncate(self.cursor + limit);
            if self.clean_index.is_some_and(|clean| clean > self.history.len()) {
                self.clean_index = None;
            }
        }
    }
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl<C: 'static> CommandHistory<C> for CommandStack<C> {
    /// Applies the command and records it. While a batch is open the command
    /// joins the innermost batch instead. Never fails.
    fn exec(&mut self, mut command: BoxedCommand<C>, ctx: &mut C) -> Result<()> {
        if let Some(batch) = self.open_batches.last_mut() {
            debug!(description = %command.description(), batch = %batch.description(), "exec into batch");
            batch.add_and_execute(command, ctx);
            return Ok(());
        }

        self.notifying(|stack| {
            debug!(description = %command.description(), cursor = stack.cursor, "exec");
            command.execute(ctx);
            stack.push_executed(command);
        });
        Ok(())
    }

    fn undo(&mut self, ctx: &mut C) {
        if self.is_batch_open() {
            warn!("undo ignored while a batch is open");
            return;
        }
        if !self.can_undo() {
            return;
        }

        self.notifying(|stack| {
            let command = &mut stack.history[stack.cursor - 1];
            debug!(description = %command.description(), cursor = stack.cursor, "undo");
            if command.can_undo() {
                command.undo(ctx);
            }
            stack.cursor -= 1;
        });
    }

    fn redo(&mut self, ctx: &mut C) {
        if self.is_batch_open() {
            warn!("redo ignored while a batch is open");
            return;
        }
        if !self.can_redo() {
            return;
        }

        self.notifying(|stack| {
            let command = &mut stack.history[stack.cursor];
            debug!(description = %command.description(), cursor = stack.cursor, "redo");
            if command.can_undo() {
                command.redo(ctx);
            }
            stack.cursor += 1;
        });
    }

    fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    fn can_redo(&self) -> bool {
        self.cursor < self.history.len()
    }

    fn undo_text(&self) -> Option<Cow<'_, str>> {
        self.undo_command().map(|command| command.description())
    }

    fn redo_text(&self) -> Option<Cow<'_, str>> {
        self.redo_command().map(|command| command.description())
    }

    /// Opens a batch, nested inside the current one if any. A `count_hint` of
    /// zero falls back to the configured capacity hint.
    fn begin_batch(&mut self, description: &str, count_hint: usize) -> Result<()> {
        let capacity = if count_hint == 0 {
            self.batch_capacity_hint
        } else {
            count_hint
        };
        debug!(description, depth = self.open_batches.len(), "begin batch");
        self.open_batches.push(CommandBatch::new(description, capacity));
        Ok(())
    }

    /// Closes the innermost batch. Its commands are already applied, so it is
    /// recorded without being executed again; an empty batch is dropped.
    fn end_batch(&mut self) -> Result<()> {
        let batch = self.open_batches.pop().ok_or(StackError::NoOpenBatch)?;
        debug!(description = %batch.description(), len = batch.len(), "end batch");

        if batch.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.open_batches.last_mut() {
            parent.push_executed(Box::new(batch));
        } else {
            self.notifying(|stack| stack.push_executed(Box::new(batch)));
        }
        Ok(())
    }
}

impl<C> fmt::Debug for CommandStack<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandStack")
            .field("len", &self.history.len())
            .field("cursor", &self.cursor)
            .field("clean_index", &self.clean_index)
            .field("changed", &self.changed)
            .field("open_batches", &self.open_batches.len())
            .finish_non_exhaustive()
    }
}
