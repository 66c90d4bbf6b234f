//! Propagation modes and the policy resolver.
//!
//! | mode | no ambient context | ambient context exists |
//! |---|---|---|
//! | `REQUIRED` | create new context | join |
//! | `REQUIRES_NEW` | create new context | suspend ambient, create new |
//! | `SUPPORTS` | run with no context | join |
//! | `NOT_SUPPORTED` | run with no context | suspend ambient, run with no context |
//! | `MANDATORY` | `NoTransaction` error | join |
//! | `NEVER` | run with no context | `ExistingTransaction` error |
//! | `NESTED` | create new context | child context with savepoint |

mod mode;
mod resolver;

pub use mode::{ParsePropagationError, Propagation};
pub use resolver::{resolve, Completion, CompletionRule, Outcome, Transition};
