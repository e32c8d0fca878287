//! Multi-agent environment abstractions.

mod traits;

pub use traits::{EnvInfo, MultiAgentEnv, MultiStepResult, EGO, PARTNER};
