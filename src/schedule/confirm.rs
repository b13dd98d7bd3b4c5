use async_trait::async_trait;
use serde::Serialize;

use crate::config::ConfirmConfig;

/// What the run asks before committing to a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferEstimate {
    pub objects: u64,
    pub bytes: u64,
}

/// Gate between listing and downloading. Implementations may block on a
/// human; the scheduler applies no timeout to this call.
#[async_trait]
pub trait ConfirmationPolicy: Send + Sync {
    async fn confirm(&self, estimate: TransferEstimate) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationPolicy for AutoApprove {
    async fn confirm(&self, _estimate: TransferEstimate) -> bool {
        true
    }
}

/// Approves only transfers within both limits. An absent limit is unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Threshold {
    pub max_objects: Option<u64>,
    pub max_bytes: Option<u64>,
}

#[async_trait]
impl ConfirmationPolicy for Threshold {
    async fn confirm(&self, estimate: TransferEstimate) -> bool {
        self.max_objects.map_or(true, |max| estimate.objects <= max)
            && self.max_bytes.map_or(true, |max| estimate.bytes <= max)
    }
}

/// Adapts a plain predicate into a policy.
pub struct FnPolicy<F>(pub F);

#[async_trait]
impl<F> ConfirmationPolicy for FnPolicy<F>
where
    F: Fn(TransferEstimate) -> bool + Send + Sync,
{
    async fn confirm(&self, estimate: TransferEstimate) -> bool {
        (self.0)(estimate)
    }
}

/// Builds the programmatic policy for a config. `None` means the config asks
/// for an interactive prompt, which only the CLI can supply.
pub fn policy_from_config(config: &ConfirmConfig) -> Option<Box<dyn ConfirmationPolicy>> {
    match config {
        ConfirmConfig::Prompt => None,
        ConfirmConfig::Auto => Some(Box::new(AutoApprove)),
        ConfirmConfig::Threshold {
            max_objects,
            max_bytes,
        } => Some(Box::new(Threshold {
            max_objects: *max_objects,
            max_bytes: *max_bytes,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(objects: u64, bytes: u64) -> TransferEstimate {
        TransferEstimate { objects, bytes }
    }

    #[tokio::test]
    async fn test_threshold_limits() {
        let policy = Threshold {
            max_objects: Some(10),
            max_bytes: Some(1000),
        };
        assert!(policy.confirm(estimate(10, 1000)).await);
        assert!(!policy.confirm(estimate(11, 10)).await);
        assert!(!policy.confirm(estimate(1, 1001)).await);

        let bytes_only = Threshold {
            max_objects: None,
            max_bytes: Some(5),
        };
        assert!(bytes_only.confirm(estimate(1_000_000, 5)).await);
    }

    #[tokio::test]
    async fn test_fn_policy() {
        let policy = FnPolicy(|e: TransferEstimate| e.objects < 3);
        assert!(policy.confirm(estimate(2, 0)).await);
        assert!(!policy.confirm(estimate(3, 0)).await);
    }

    #[test]
    fn test_prompt_config_has_no_programmatic_policy() {
        assert!(policy_from_config(&ConfirmConfig::Prompt).is_none());
        assert!(policy_from_config(&ConfirmConfig::Auto).is_some());
    }
}
