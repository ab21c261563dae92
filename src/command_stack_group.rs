use std::{borrow::Cow, collections::BTreeMap, fmt, num::NonZeroUsize};

use tracing::{debug, warn};

use crate::{
    command_stack::CommandStack,
    config::StackConfig,
    error::{Result, StackError},
    traits::{
        command::{BoxedCommand, CommandId},
        command_history::CommandHistory,
        stack_observer::{notify_diff, StackObserver, StackState},
    },
};

/// Handle to a stack owned by a [`CommandStackGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackId(u64);

impl StackId {
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owns one [`CommandStack`] per open document and routes commands to the
/// active one.
///
/// Switching the active stack never touches any history, so every document
/// keeps its own undo/redo state.
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
/// let mut group = CommandStackGroup::new();
/// let first = group.create_stack();
/// let second = group.create_stack();
/// let mut value = 0;
///
/// group.set_active_stack(Some(first)).unwrap();
/// group.exec(Box::new(Add(1)), &mut value).unwrap();
/// group.set_active_stack(Some(second)).unwrap();
/// assert!(!group.can_undo());
/// assert_eq!(group.stack(first).map(|stack| stack.len()), Some(1));
/// ```
pub struct CommandStackGroup<C> {
    stacks: BTreeMap<StackId, CommandStack<C>>,
    active: Option<StackId>,
    next_id: u64,
    config: StackConfig,
    observer: Option<Box<dyn StackObserver>>,
}

impl<C: 'static> Default for CommandStackGroup<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> CommandStackGroup<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StackConfig::default())
    }

    /// Stacks created by [`create_stack`](Self::create_stack) use `config`.
    #[must_use]
    pub fn with_config(config: StackConfig) -> Self {
        Self {
            stacks: BTreeMap::new(),
            active: None,
            next_id: 1,
            config,
            observer: None,
        }
    }

    /// Receives the events of whichever stack is active, plus the changes
    /// caused by switching stacks.
    pub fn set_observer<O>(&mut self, observer: O)
    where
        O: StackObserver + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    pub fn take_observer(&mut self) -> Option<Box<dyn StackObserver>> {
        self.observer.take()
    }

    pub fn create_stack(&mut self) -> StackId {
        let stack = CommandStack::with_config(&self.config);
        self.add_stack(stack)
    }

    /// Takes ownership of `stack`. The active stack is unchanged.
    pub fn add_stack(&mut self, stack: CommandStack<C>) -> StackId {
        let id = StackId(self.next_id);
        self.next_id += 1;
        self.stacks.insert(id, stack);
        debug!(stack = %id, "added command stack");
        id
    }

    /// Destroys the stack and its whole history. Removing the active stack
    /// leaves the group without an active stack.
    ///
    /// # Errors
    ///
    /// [`StackError::UnknownStack`] if the group does not own `id`.
    pub fn remove_stack(&mut self, id: StackId) -> Result<()> {
        if !self.stacks.contains_key(&id) {
            warn!(stack = %id, "cannot remove unknown command stack");
            return Err(StackError::UnknownStack(id));
        }

        self.notifying(|group| {
            if group.active == Some(id) {
                group.active = None;
            }
            group.stacks.remove(&id);
        });
        debug!(stack = %id, "removed command stack");
        Ok(())
    }

    /// Makes `id` the stack receiving new commands, or deactivates all
    /// stacks with `None`.
    ///
    /// # Errors
    ///
    /// [`StackError::UnknownStack`] if the group does not own `id`; the
    /// active stack is left as it was.
    pub fn set_active_stack(&mut self, id: Option<StackId>) -> Result<()> {
        if let Some(id) = id {
            if !self.stacks.contains_key(&id) {
                warn!(stack = %id, "cannot activate unknown command stack");
                return Err(StackError::UnknownStack(id));
            }
        }

        self.notifying(|group| group.active = id);
        debug!(stack = ?id.map(StackId::raw), "active command stack changed");
        Ok(())
    }

    #[must_use]
    pub fn active_stack_id(&self) -> Option<StackId> {
        self.active
    }

    #[must_use]
    pub fn active_stack(&self) -> Option<&CommandStack<C>> {
        self.active.and_then(|id| self.stacks.get(&id))
    }

    #[must_use]
    pub fn stack(&self, id: StackId) -> Option<&CommandStack<C>> {
        self.stacks.get(&id)
    }

    /// Direct access to a stack. Changes made through it are not reported to
    /// the group observer.
    pub fn stack_mut(&mut self, id: StackId) -> Option<&mut CommandStack<C>> {
        self.stacks.get_mut(&id)
    }

    #[must_use]
    pub fn contains(&self, id: StackId) -> bool {
        self.stacks.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = StackId> + '_ {
        self.stacks.keys().copied()
    }

    /// Applies `limit` to every stack, including those created later.
    pub fn set_history_limit(&mut self, limit: NonZeroUsize) {
        self.config.history_limit = Some(limit);
        self.notifying(|group| {
            for stack in group.stacks.values_mut() {
                stack.set_history_limit(limit);
            }
        });
    }

    /// Clean state of the active stack. A group with no active stack is clean.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.active_stack().map_or(true, CommandStack::is_clean)
    }

    /// Marks the active stack as saved. Does nothing without an active stack.
    pub fn set_clean(&mut self) {
        self.notifying(|group| {
            if let Some(stack) = group.active_stack_mut() {
                stack.set_clean();
            }
        });
    }

    /// Removes matching commands from every stack, not only the active one.
    pub fn remove_commands(&mut self, id: CommandId) -> usize {
        self.notifying(|group| {
            group
                .stacks
                .values_mut()
                .map(|stack| stack.remove_commands(id))
                .sum()
        })
    }

    #[must_use]
    pub fn state(&self) -> StackState {
        self.active_stack().map(CommandStack::state).unwrap_or_default()
    }

    fn active_stack_mut(&mut self) -> Option<&mut CommandStack<C>> {
        self.active.and_then(|id| self.stacks.get_mut(&id))
    }

    fn require_active(&self) -> Result<StackId> {
        self.active.ok_or_else(|| {
            warn!("no active command stack");
            StackError::NoActiveStack
        })
    }

    fn stack_mut_or_err(&mut self, id: StackId) -> Result<&mut CommandStack<C>> {
        self.stacks.get_mut(&id).ok_or(StackError::UnknownStack(id))
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
}

impl<C: 'static> CommandHistory<C> for CommandStackGroup<C> {
    /// Routes `command` to the active stack.
    ///
    /// # Errors
    ///
    /// [`StackError::NoActiveStack`] if no stack is active; the command is
    /// dropped without being executed.
    fn exec(&mut self, command: BoxedCommand<C>, ctx: &mut C) -> Result<()> {
        let id = self.require_active()?;
        self.notifying(|group| group.stack_mut_or_err(id)?.exec(command, ctx))
    }

    fn undo(&mut self, ctx: &mut C) {
        self.notifying(|group| {
            if let Some(stack) = group.active_stack_mut() {
                stack.undo(ctx);
            }
        });
    }

    fn redo(&mut self, ctx: &mut C) {
        self.notifying(|group| {
            if let Some(stack) = group.active_stack_mut() {
                stack.redo(ctx);
            }
        });
    }

    fn can_undo(&self) -> bool {
        self.active_stack().is_some_and(|stack| stack.can_undo())
    }

    fn can_redo(&self) -> bool {
        self.active_stack().is_some_and(|stack| stack.can_redo())
    }

    fn undo_text(&self) -> Option<Cow<'_, str>> {
        self.active_stack().and_then(|stack| stack.undo_text())
    }

    fn redo_text(&self) -> Option<Cow<'_, str>> {
        self.active_stack().and_then(|stack| stack.redo_text())
    }

    fn begin_batch(&mut self, description: &str, count_hint: usize) -> Result<()> {
        let id = self.require_active()?;
        self.stack_mut_or_err(id)?.begin_batch(description, count_hint)
    }

    fn end_batch(&mut self) -> Result<()> {
        let id = self.require_active()?;
        self.notifying(|group| group.stack_mut_or_err(id)?.end_batch())
    }
}

impl<C> fmt::Debug for CommandStackGroup<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandStackGroup")
            .field("stacks", &self.stacks)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    use crate::traits::{command::Command, stack_observer::StackEvent};

    const ADD: CommandId = CommandId(10);

    struct TestCommand {
        value: i32,
    }

    impl Command for TestCommand {
        type Context = i32;

        fn execute(&mut self, ctx: &mut i32) {
            *ctx += self.value;
        }

        fn undo(&mut self, ctx: &mut i32) {
            *ctx -= self.value;
        }

        fn description(&self) -> Cow<'_, str> {
            Cow::Owned(format!("add {}", self.value))
        }

        fn id(&self) -> CommandId {
            ADD
        }
    }

    fn add(value: i32) -> BoxedCommand<i32> {
        Box::new(TestCommand { value })
    }

    #[test]
    fn test_new() {
        let group = CommandStackGroup::<i32>::new();

        assert!(group.is_empty());
        assert!(group.active_stack_id().is_none());
        assert!(!group.can_undo());
        assert!(!group.can_redo());
        assert!(group.is_clean());
    }

    #[test]
    fn test_add_stack_keeps_active() {
        let mut group = CommandStackGroup::<i32>::new();
        let first = group.create_stack();
        group.set_active_stack(Some(first)).unwrap();

        let second = group.add_stack(CommandStack::new());

        assert_ne!(first, second);
        assert_eq!(group.active_stack_id(), Some(first));
        assert_eq!(group.ids().collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_routing_between_stacks() {
        let mut group = CommandStackGroup::new();
        let s1 = group.create_stack();
        let s2 = group.create_stack();
        let (mut doc1, mut doc2) = (0, 0);

        group.set_active_stack(Some(s1)).unwrap();
        group.exec(add(1), &mut doc1).unwrap();
        group.exec(add(2), &mut doc1).unwrap();
        group.undo(&mut doc1);

        group.set_active_stack(Some(s2)).unwrap();
        group.exec(add(5), &mut doc2).unwrap();

        let first = group.stack(s1).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.cursor(), 1);
        assert_eq!(group.stack(s2).unwrap().len(), 1);
        assert_eq!(group.undo_text().as_deref(), Some("add 5"));

        group.set_active_stack(Some(s1)).unwrap();
        assert!(group.can_redo());
        group.redo(&mut doc1);
        assert_eq!((doc1, doc2), (3, 5));
    }

    #[test]
    fn test_remove_active_stack() {
        let mut group = CommandStackGroup::new();
        let s1 = group.create_stack();
        let s2 = group.create_stack();
        let mut doc = 0;

        group.set_active_stack(Some(s2)).unwrap();
        group.exec(add(1), &mut doc).unwrap();
        group.remove_stack(s2).unwrap();

        assert!(group.active_stack_id().is_none());
        assert!(!group.contains(s2));
        assert!(group.contains(s1));
        assert_eq!(group.exec(add(1), &mut doc), Err(StackError::NoActiveStack));
        assert_eq!(doc, 1, "rejected command is not executed");

        group.undo(&mut doc);
        assert_eq!(doc, 1);
    }

    #[test]
    fn test_remove_inactive_stack() {
        let mut group = CommandStackGroup::<i32>::new();
        let s1 = group.create_stack();
        let s2 = group.create_stack();

        group.set_active_stack(Some(s1)).unwrap();
        group.remove_stack(s2).unwrap();

        assert_eq!(group.active_stack_id(), Some(s1));
        assert_eq!(group.remove_stack(s2), Err(StackError::UnknownStack(s2)));
    }

    #[test]
    fn test_activate_unknown_stack() {
        let mut group = CommandStackGroup::<i32>::new();
        let s1 = group.create_stack();
        group.set_active_stack(Some(s1)).unwrap();

        let stranger = StackId::from_raw(99);
        assert_eq!(
            group.set_active_stack(Some(stranger)),
            Err(StackError::UnknownStack(stranger))
        );
        assert_eq!(group.active_stack_id(), Some(s1));

        group.set_active_stack(None).unwrap();
        assert!(group.active_stack_id().is_none());
    }

    #[test]
    fn test_batches_route_to_active() {
        let mut group = CommandStackGroup::new();
        let mut doc = 0;

        assert_eq!(group.begin_batch("none", 1), Err(StackError::NoActiveStack));
        assert_eq!(group.end_batch(), Err(StackError::NoActiveStack));

        let id = group.create_stack();
        group.set_active_stack(Some(id)).unwrap();
        group
            .batch_execute("sum", vec![add(1), add(2), add(3)], &mut doc)
            .unwrap();

        assert_eq!(doc, 6);
        assert_eq!(group.undo_text().as_deref(), Some("sum"));
        group.undo(&mut doc);
        assert_eq!(doc, 0);
    }

    #[test]
    fn test_clean_and_remove_commands() {
        let mut group = CommandStackGroup::new();
        let s1 = group.create_stack();
        let s2 = group.create_stack();
        let mut doc = 0;

        group.set_active_stack(Some(s1)).unwrap();
        group.exec(add(1), &mut doc).unwrap();
        assert!(!group.is_clean());
        group.set_clean();
        assert!(group.is_clean());

        group.set_active_stack(Some(s2)).unwrap();
        group.exec(add(1), &mut doc).unwrap();

        assert_eq!(group.remove_commands(ADD), 2);
        assert!(group.stack(s1).unwrap().is_empty());
        assert!(group.stack(s2).unwrap().is_empty());
    }

    #[test]
    fn test_history_limit_applies_to_new_stacks() {
        let mut group = CommandStackGroup::new();
        let old = group.create_stack();
        let mut doc = 0;

        group.set_active_stack(Some(old)).unwrap();
        for _ in 0..4 {
            group.exec(add(1), &mut doc).unwrap();
        }
        group.set_history_limit(NonZeroUsize::new(2).unwrap());
        let new = group.create_stack();

        assert_eq!(group.stack(old).unwrap().len(), 2);
        assert_eq!(
            group.stack(new).unwrap().history_limit(),
            NonZeroUsize::new(2)
        );
    }

    #[test]
    fn test_observer_follows_active_stack() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let mut group = CommandStackGroup::new();
        group.set_observer(move |event: &StackEvent| sink.lock().push(event.clone()));
        let s1 = group.create_stack();
        let s2 = group.create_stack();
        let mut doc = 0;

        group.set_active_stack(Some(s1)).unwrap();
        assert!(events.lock().is_empty(), "fresh stack looks like no stack");

        group.exec(add(1), &mut doc).unwrap();
        events.lock().clear();

        group.set_active_stack(Some(s2)).unwrap();
        assert_eq!(
            events.lock().drain(..).collect::<Vec<_>>(),
            vec![
                StackEvent::CleanChanged(true),
                StackEvent::CanUndoChanged(false),
                StackEvent::UndoTextChanged(None),
            ]
        );

        group.set_active_stack(Some(s1)).unwrap();
        group.remove_stack(s1).unwrap();
        assert_eq!(
            events.lock().drain(..).collect::<Vec<_>>(),
            vec![
                StackEvent::CleanChanged(false),
                StackEvent::CanUndoChanged(true),
                StackEvent::UndoTextChanged(Some("add 1".into())),
                StackEvent::CleanChanged(true),
                StackEvent::CanUndoChanged(false),
                StackEvent::UndoTextChanged(None),
            ]
        );
    }
}
