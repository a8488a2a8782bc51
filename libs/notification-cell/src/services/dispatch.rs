// libs/notification-cell/src/services/dispatch.rs
use reqwest::Client;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::BookingConfirmedNotice;

/// One-way dispatcher to the outbound notification pipeline.
///
/// Delivery is best-effort: failures are logged and never feed back into
/// booking state. Callers spawn `notify_booking_confirmed` rather than
/// awaiting it on the request path.
pub struct NotificationDispatcher {
    client: Client,
    webhook_url: String,
}

impl NotificationDispatcher {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            webhook_url: config.notification_webhook_url.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    pub async fn notify_booking_confirmed(&self, notice: BookingConfirmedNotice) {
        if !self.is_enabled() {
            debug!(
                "Notification dispatch disabled, skipping notice for booking {}",
                notice.booking_id
            );
            return;
        }

        debug!("Dispatching confirmation notice for booking {}", notice.booking_id);

        let result = self
            .client
            .post(&self.webhook_url)
            .json(&notice)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(
                    "Confirmation notice delivered for booking {}",
                    notice.booking_id
                );
            }
            Ok(response) => {
                warn!(
                    "Notification sink returned {} for booking {}",
                    response.status(),
                    notice.booking_id
                );
            }
            Err(e) => {
                warn!(
                    "Failed to dispatch confirmation notice for booking {}: {}",
                    notice.booking_id, e
                );
            }
        }
    }
}
