#![warn(clippy::pedantic)]
#![warn(clippy::perf)]
#![warn(clippy::style)]
#![warn(clippy::correctness)]
#![warn(clippy::complexity)]
#![warn(clippy::suspicious)]
#![warn(clippy::cargo)]

pub mod command_batch;
pub mod command_stack;
pub mod command_stack_group;
pub mod concurrent_stack_group;
pub mod config;
pub mod error;
pub mod traits;

pub mod prelude {
	pub use crate::command_batch::CommandBatch;
	pub use crate::command_stack::CommandStack;
	pub use crate::command_stack_group::{CommandStackGroup, StackId};
	pub use crate::concurrent_stack_group::ConcurrentCommandStackGroup;
	pub use crate::config::StackConfig;
	pub use crate::error::StackError;
	pub use crate::traits::command::{BoxedCommand, Command, CommandId};
	pub use crate::traits::command_history::CommandHistory;
	pub use crate::traits::stack_observer::{StackEvent, StackObserver, StackState};
}
