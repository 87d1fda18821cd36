//! `kaya-agents` — intent parsing, the Full and Iterative Fix pipelines,
//! the Scribe/Critic/Runner/Medic/Gemini specialist workers, and the CLI
//! surface that drives them over a [`kaya_core`] runtime.

pub mod cli;
pub mod fs_guard;
pub mod intent;
pub mod pipeline;
pub mod process_pool;
pub mod prompts;
pub mod runtime;
pub mod workers;
