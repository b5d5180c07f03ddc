//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `TaskState`: lifecycle of a single crawl task, from queue to a terminal
//!   outcome, as recorded in the provenance manifest

mod task_state;

pub use task_state::TaskState;
