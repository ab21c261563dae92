pub mod command;
pub mod command_history;
pub mod stack_observer;
