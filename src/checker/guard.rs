//! Cross-context identity check.

use super::CompiledChecker;
use crate::context::ExecutionContext;
use crate::error::ContextMixError;

/// Verifies a checker may be used with a context.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityGuard;

impl IdentityGuard {
    /// Fails when `checker` was built in any context other than `context`.
    ///
    /// Runs before every scan; a stale checker from a replaced generation
    /// never reaches the engine.
    pub fn verify(checker: &CompiledChecker, context: &ExecutionContext) -> Result<(), ContextMixError> {
        let built_in = checker.tag();
        let target = context.tag();
        if built_in.id == target.id && built_in.generation == target.generation {
            return Ok(());
        }
        tracing::error!(expected = %built_in, actual = %target, location = %checker.location(), "Context mix detected");
        Err(ContextMixError::new(built_in, built_in.generation, target, target.generation))
    }
}
