//! Rewrite sessions: stream accumulation, throttled diffing and the run lifecycle.
//!
//! [`RewriteSession`] is the synchronous state machine (`Idle`, `Streaming`,
//! `Finalizing`, `Settled`, with `Failed`/`Cancelled` falling back to `Idle`).
//! [`SessionController`] runs one session at a time on a tokio task against a
//! [`core_service::CorrectionService`], applying the overall timeout, the
//! optional settle delay and cancellation, and reporting through
//! [`core_events::SessionEvent`]s.

mod accumulator;
mod controller;
mod session;

pub use accumulator::StreamAccumulator;
pub use controller::SessionController;
pub use session::{RewriteSession, SessionPhase, Settlement, StartError};
