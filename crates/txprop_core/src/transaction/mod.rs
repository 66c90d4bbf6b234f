//! Transaction contexts and the manager that drives them.
//!
//! A call chain starts with [`TransactionManager::run`]. Every operation
//! body receives a [`Scope`]; child operations are invoked through
//! [`Scope::run`] with their own propagation mode. The manager resolves the
//! mode against the scope's context, performs the transition, runs the body
//! and completes the frame:
//!
//! - **Participants** (joined frames) never commit; a failure dooms the
//!   shared context
//! - **Owners** (new or independent contexts) commit or roll back
//! - **Nested children** release into their parent or roll back to the
//!   savepoint taken when they began
//! - **Detached frames** have no context; each write commits on its own

mod manager;
mod scope;
mod state;

pub use manager::TransactionManager;
pub use scope::Scope;
pub use state::{ContextState, PendingWrite, RollbackCause, TransactionContext, WriteRecord};
