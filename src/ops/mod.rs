pub mod board;
pub mod cache;
pub mod mutation;
pub mod selection;
pub mod task_ops;
