//! Provider workflows: declarative definitions and the engine that runs them.

pub mod definition;
pub mod engine;
mod state;

pub use definition::{Action, DefinitionBuilder, Field, ProviderDefinition, Step, Wait};
pub use engine::{execute, ExecutionContext};
pub use state::State;
