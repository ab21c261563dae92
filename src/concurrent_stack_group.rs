use std::{
    collections::BTreeMap,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::{
    command_stack::CommandStack,
    command_stack_group::StackId,
    config::StackConfig,
    error::{Result, StackError},
    traits::{
        command::{BoxedCommand, CommandId},
        command_history::CommandHistory,
        stack_observer::{notify_diff, StackObserver, StackState},
    },
};

type SharedStack<C> = Arc<Mutex<CommandStack<C>>>;

/// A stack group that can be driven from several threads.
///
/// Every stack sits behind its own mutex, held for a whole exec, undo or redo
/// including the children of a batch. The active id has a separate mutex that
/// is released as soon as the target stack is resolved, so commands running
/// on different stacks never wait for each other.
///
/// Lock order is `active`, then `stacks`, then a single stack. The observer
/// is notified after every lock is released, but it must not call back into
/// the group.
pub struct ConcurrentCommandStackGroup<C> {
    stacks: RwLock<BTreeMap<StackId, SharedStack<C>>>,
    active: Mutex<Option<StackId>>,
    next_id: AtomicU64,
    config: RwLock<StackConfig>,
    observer: Mutex<Option<Box<dyn StackObserver>>>,
}

impl<C: 'static> ConcurrentCommandStackGroup<C> {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_config(StackConfig::default())
    }

    #[must_use]
    pub fn with_config(config: StackConfig) -> Arc<Self> {
        Arc::new(Self {
            stacks: RwLock::new(BTreeMap::new()),
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
            config: RwLock::new(config),
            observer: Mutex::new(None),
        })
    }

    /// Receives the events of whichever stack is active, plus the changes
    /// caused by switching stacks.
    pub fn set_observer<O>(&self, observer: O)
    where
        O: StackObserver + 'static,
    {
        *self.observer.lock() = Some(Box::new(observer));
    }

    pub fn take_observer(&self) -> Option<Box<dyn StackObserver>> {
        self.observer.lock().take()
    }

    pub fn create_stack(&self) -> StackId {
        let stack = CommandStack::with_config(&self.config.read());
        self.add_stack(stack)
    }

    pub fn add_stack(&self, stack: CommandStack<C>) -> StackId {
        let id = StackId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.stacks.write().insert(id, Arc::new(Mutex::new(stack)));
        debug!(stack = %id, "added command stack");
        id
    }

    /// Removes the stack from the group. A thread still running a command on
    /// it finishes first; the history is dropped with the last reference.
    ///
    /// # Errors
    ///
    /// [`StackError::UnknownStack`] if the group does not own `id`.
    pub fn remove_stack(&self, id: StackId) -> Result<()> {
        let observed = self.observer.lock().is_some();
        let mut active = self.active.lock();
        let before = (observed && *active == Some(id)).then(|| self.state_of(Some(id)));

        if self.stacks.write().remove(&id).is_none() {
            warn!(stack = %id, "cannot remove unknown command stack");
            return Err(StackError::UnknownStack(id));
        }
        if *active == Some(id) {
            *active = None;
        }
        drop(active);

        debug!(stack = %id, "removed command stack");
        if let Some(before) = before {
            self.notify(&before, &StackState::default());
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`StackError::UnknownStack`] if the group does not own `id`.
    pub fn set_active_stack(&self, id: Option<StackId>) -> Result<()> {
        let observed = self.observer.lock().is_some();
        let mut active = self.active.lock();
        if let Some(id) = id {
            if !self.stacks.read().contains_key(&id) {
                warn!(stack = %id, "cannot activate unknown command stack");
                return Err(StackError::UnknownStack(id));
            }
        }

        let before = observed.then(|| self.state_of(*active));
        *active = id;
        let after = observed.then(|| self.state_of(id));
        drop(active);

        debug!(stack = ?id.map(StackId::raw), "active command stack changed");
        if let (Some(before), Some(after)) = (before, after) {
            self.notify(&before, &after);
        }
        Ok(())
    }

    #[must_use]
    pub fn active_stack_id(&self) -> Option<StackId> {
        *self.active.lock()
    }

    #[must_use]
    pub fn stack(&self, id: StackId) -> Option<SharedStack<C>> {
        self.stacks.read().get(&id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: StackId) -> bool {
        self.stacks.read().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.read().is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<StackId> {
        self.stacks.read().keys().copied().collect()
    }

    /// Runs `f` with exclusive access to the stack `id`. Changes made through
    /// it are not reported to the group observer.
    ///
    /// # Errors
    ///
    /// [`StackError::UnknownStack`] if the group does not own `id`.
    pub fn with_stack<R>(
        &self,
        id: StackId,
        f: impl FnOnce(&mut CommandStack<C>) -> R,
    ) -> Result<R> {
        let stack = self.stack(id).ok_or(StackError::UnknownStack(id))?;
        let mut guard = stack.lock();
        Ok(f(&mut guard))
    }

    /// Runs `f` with exclusive access to the active stack. Changes made
    /// through it are not reported to the group observer.
    ///
    /// # Errors
    ///
    /// [`StackError::NoActiveStack`] if no stack is active.
    pub fn with_active_stack<R>(
        &self,
        f: impl FnOnce(&mut CommandStack<C>) -> R,
    ) -> Result<R> {
        let stack = self.require_active()?;
        let mut guard = stack.lock();
        Ok(f(&mut guard))
    }

    /// # Errors
    ///
    /// [`StackError::NoActiveStack`] if no stack is active; the command is
    /// dropped without being executed.
    pub fn exec(&self, command: BoxedCommand<C>, ctx: &mut C) -> Result<()> {
        let stack = self.require_active()?;
        self.notifying(&stack, |stack| stack.exec(command, ctx))
    }

    pub fn undo(&self, ctx: &mut C) {
        if let Some(stack) = self.resolve_active() {
            self.notifying(&stack, |stack| stack.undo(ctx));
        }
    }

    pub fn redo(&self, ctx: &mut C) {
        if let Some(stack) = self.resolve_active() {
            self.notifying(&stack, |stack| stack.redo(ctx));
        }
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.resolve_active().is_some_and(|stack| stack.lock().can_undo())
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.resolve_active().is_some_and(|stack| stack.lock().can_redo())
    }

    #[must_use]
    pub fn undo_text(&self) -> Option<String> {
        let stack = self.resolve_active()?;
        let guard = stack.lock();
        guard.undo_text().map(std::borrow::Cow::into_owned)
    }

    #[must_use]
    pub fn redo_text(&self) -> Option<String> {
        let stack = self.resolve_active()?;
        let guard = stack.lock();
        guard.redo_text().map(std::borrow::Cow::into_owned)
    }

    /// # Errors
    ///
    /// [`StackError::NoActiveStack`] if no stack is active.
    pub fn begin_batch(&self, description: &str, count_hint: usize) -> Result<()> {
        self.with_active_stack(|stack| stack.begin_batch(description, count_hint))?
    }

    /// # Errors
    ///
    /// [`StackError::NoActiveStack`] if no stack is active, or
    /// [`StackError::NoOpenBatch`] if the active stack has no open batch.
    pub fn end_batch(&self) -> Result<()> {
        let stack = self.require_active()?;
        self.notifying(&stack, |stack| stack.end_batch())
    }

    /// Clean state of the active stack. A group with no active stack is clean.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.resolve_active().map_or(true, |stack| stack.lock().is_clean())
    }

    /// Marks the active stack as saved. Does nothing without an active stack.
    pub fn set_clean(&self) {
        if let Some(stack) = self.resolve_active() {
            self.notifying(&stack, |stack| stack.set_clean());
        }
    }

    /// Removes matching commands from every stack, not only the active one.
    pub fn remove_commands(&self, id: CommandId) -> usize {
        self.each_stack(|stack| stack.remove_commands(id)).into_iter().sum()
    }

    /// Applies `limit` to every stack, including those created later.
    pub fn set_history_limit(&self, limit: NonZeroUsize) {
        self.config.write().history_limit = Some(limit);
        self.each_stack(|stack| stack.set_history_limit(limit));
    }

    /// State of the active stack, or of an empty saved stack when none is
    /// active.
    #[must_use]
    pub fn state(&self) -> StackState {
        self.state_of(*self.active.lock())
    }

    /// Clones the active stack's handle; both group locks are released on return.
    fn resolve_active(&self) -> Option<SharedStack<C>> {
        let active = self.active.lock();
        let id = (*active)?;
        self.stacks.read().get(&id).cloned()
    }

    fn require_active(&self) -> Result<SharedStack<C>> {
        self.resolve_active().ok_or_else(|| {
            warn!("no active command stack");
            StackError::NoActiveStack
        })
    }

    fn state_of(&self, id: Option<StackId>) -> StackState {
        let stack = id.and_then(|id| self.stacks.read().get(&id).cloned());
        stack.map(|stack| stack.lock().state()).unwrap_or_default()
    }

    /// Runs `f` on every stack in turn, reporting changes to the active one.
    fn each_stack<R>(&self, mut f: impl FnMut(&mut CommandStack<C>) -> R) -> Vec<R> {
        let active = self.resolve_active();
        let stacks: Vec<_> = self.stacks.read().values().cloned().collect();
        stacks
            .iter()
            .map(|stack| {
                if active.as_ref().is_some_and(|active| Arc::ptr_eq(active, stack)) {
                    self.notifying(stack, &mut f)
                } else {
                    f(&mut stack.lock())
                }
            })
            .collect()
    }

    /// Runs `f` under the stack lock and reports the resulting state changes
    /// once the lock is released.
    fn notifying<R>(
        &self,
        stack: &SharedStack<C>,
        f: impl FnOnce(&mut CommandStack<C>) -> R,
    ) -> R {
        if self.observer.lock().is_none() {
            return f(&mut stack.lock());
        }
        let mut guard = stack.lock();
        let before = guard.state();
        let result = f(&mut guard);
        let after = guard.state();
        drop(guard);
        self.notify(&before, &after);
        result
    }

    fn notify(&self, before: &StackState, after: &StackState) {
        notify_diff(self.observer.lock().as_mut(), before, after);
    }
}
