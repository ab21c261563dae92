use crate::command_stack_group::StackId;

/// Errors reported by command stacks and stack groups.
///
/// Undoing past the start of a history or redoing past its end is not an
/// error; those calls are silently ignored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    /// The id does not belong to a stack owned by the group.
    #[error("unknown command stack: {0}")]
    UnknownStack(StackId),

    /// The group has no active stack to route the call to.
    #[error("no active command stack")]
    NoActiveStack,

    /// `end_batch` was called without a matching `begin_batch`.
    #[error("no open batch to end")]
    NoOpenBatch,
}

pub type Result<T, E = StackError> = std::result::Result<T, E>;
