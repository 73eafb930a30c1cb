//! Notification hub port.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::errors::GuardianResult;
use crate::domain::models::signal::Severity;

/// Fan-out to the configured notification channels.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message to every configured channel. Returns per-channel
    /// delivery status; a missing channel is simply absent from the map.
    async fn notify(&self, message: &str, severity: Severity) -> HashMap<String, bool>;

    /// Open a ticket in the configured ticketing system; returns its id.
    async fn create_ticket(
        &self,
        title: &str,
        description: &str,
        severity: Severity,
    ) -> GuardianResult<String>;
}
