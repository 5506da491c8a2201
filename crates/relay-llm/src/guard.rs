use serde::Serialize;
use thiserror::Error;

use crate::context::RequestContext;

/// Why the guard stopped a request's fallback search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GuardRefusal {
    #[error("cost ceiling reached: spent {spent:.4} of {ceiling:.4}")]
    CostCeiling { spent: f64, ceiling: f64 },
    #[error("attempt depth exhausted after {attempts} attempts")]
    DepthExhausted { attempts: usize },
}

/// Bounds the cost and depth of one request's retry search
#[derive(Debug, Clone, Copy)]
pub struct CostDepthGuard {
    ceiling: f64,
}

impl CostDepthGuard {
    pub const fn new(ceiling: f64) -> Self {
        Self { ceiling }
    }

    pub const fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Decide whether another attempt may start
    ///
    /// # Errors
    ///
    /// Returns the refusal reason when the accumulated cost has reached the
    /// ceiling or every chain position has been attempted
    pub fn check(&self, ctx: &RequestContext) -> Result<(), GuardRefusal> {
        if ctx.cost() >= self.ceiling {
            return Err(GuardRefusal::CostCeiling {
                spent: ctx.cost(),
                ceiling: self.ceiling,
            });
        }

        if ctx.attempts() >= ctx.chain_len() {
            return Err(GuardRefusal::DepthExhausted {
                attempts: ctx.attempts(),
            });
        }

        Ok(())
    }

    pub fn allow_next_attempt(&self, ctx: &RequestContext) -> bool {
        self.check(ctx).is_ok()
    }
}
