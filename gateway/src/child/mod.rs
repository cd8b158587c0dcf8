//! Child process supervision
//!
//! The gateway owns exactly one tool-server child for its whole lifetime.
//!
//! ```text
//! ┌──────────────┐   mpsc queue    ┌─────────────┐   stdin (lines)
//! │   sessions   │ ──────────────→ │ writer task │ ──────────────→ ┌───────┐
//! └──────────────┘                 └─────────────┘                 │ child │
//!        ↑          correlation    ┌─────────────┐  stdout (lines) └───────┘
//!        └──────────────────────── │ reader task │ ←──────────────────┘
//!                                  └─────────────┘
//! ```
//!
//! A third task waits on the process itself: an unexpected exit clears the
//! liveness flag (failing `/ping`) and fails every in-flight request. The
//! gateway does not restart the child; the hosting platform restarts the
//! container once health checks fail.

mod supervisor;

pub use supervisor::{ChildHandle, ChildSpec};
