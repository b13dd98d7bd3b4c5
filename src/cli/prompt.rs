use async_trait::async_trait;
use console::style;
use dialoguer::Confirm;
use tracing::warn;

use super::progress::human_bytes;
use crate::schedule::{ConfirmationPolicy, TransferEstimate};

/// Asks on the terminal before a download starts. Anything but a clear yes,
/// including a failed prompt, declines.
pub struct PromptPolicy;

#[async_trait]
impl ConfirmationPolicy for PromptPolicy {
    async fn confirm(&self, estimate: TransferEstimate) -> bool {
        let question = format!(
            "Download {} objects ({})?",
            style(estimate.objects).cyan(),
            style(human_bytes(estimate.bytes)).cyan()
        );
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(question)
                .default(true)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(proceed)) => proceed,
            Ok(Err(e)) => {
                warn!(error = %e, "Confirmation prompt failed, declining");
                false
            }
            Err(e) => {
                warn!(error = %e, "Confirmation prompt task failed, declining");
                false
            }
        }
    }
}
