//! Built-in two-player environments for coplay.
//!
//! Both players hold opposite ends of a beam balanced on a pivot and share
//! one reward per tick the beam stays level:
//! - `BalanceLine` - One beam, stepped through the serial backend
//! - `BalanceBatch` - Many beams stepped together for the batched backend

mod balance;
mod balance_batch;
pub mod beam;

pub use balance::BalanceLine;
pub use balance_batch::BalanceBatch;
pub use beam::BeamParams;
