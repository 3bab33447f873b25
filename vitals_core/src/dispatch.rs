//! Notification fan-out across channel providers.
//!
//! A notification goes to every provider enabled for the user and domain.
//! Actions are adapted to each provider's capabilities (dropped entirely,
//! or truncated to the first N). Providers fail independently; the call
//! succeeds when at least one accepted the message.

use crate::notification::DeliveryReceipt;
use crate::{Domain, Error, Notification, NotificationAction, Result, SentHandle};

/// Result of trying to retract a notification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    Unsupported,
}

/// A delivery mechanism described by its capabilities
pub trait ChannelProvider: Send + Sync {
    /// Stable identifier recorded in delivery receipts
    fn name(&self) -> &str;

    fn is_enabled(&self, user_id: &str, domain: Domain) -> bool;

    fn supports_actions(&self) -> bool;

    fn max_actions(&self) -> usize;

    fn supports_removal(&self) -> bool {
        false
    }

    /// Deliver and return a provider-specific handle
    fn send(&self, user_id: &str, notification: &Notification) -> Result<String>;

    fn remove(&self, _handle: &str) -> Result<RemovalOutcome> {
        Ok(RemovalOutcome::Unsupported)
    }
}

/// Outcome of a dispatch with at least one successful delivery
#[derive(Clone, Debug, Default)]
pub struct DispatchReport {
    pub handle: SentHandle,
    /// Providers that failed, with their error text
    pub failures: Vec<(String, String)>,
}

/// Actions a provider will actually receive, in their original order
pub fn adapt_actions(provider: &dyn ChannelProvider, actions: &[NotificationAction]) -> Vec<NotificationAction> {
    if !provider.supports_actions() {
        return Vec::new();
    }
    actions.iter().take(provider.max_actions()).cloned().collect()
}

#[derive(Default)]
pub struct Dispatcher {
    providers: Vec<Box<dyn ChannelProvider>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Box<dyn ChannelProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn add_provider(&mut self, provider: Box<dyn ChannelProvider>) {
        self.providers.push(provider);
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Send to every enabled provider
    ///
    /// Fails with [`Error::Delivery`] when no provider is enabled or all of
    /// them failed; the caller must then leave its state untouched.
    pub fn dispatch(&self, user_id: &str, notification: &Notification) -> Result<DispatchReport> {
        let domain = notification.domain();
        let enabled: Vec<&dyn ChannelProvider> = self
            .providers
            .iter()
            .map(|p| &**p)
            .filter(|p| p.is_enabled(user_id, domain))
            .collect();

        if enabled.is_empty() {
            return Err(Error::Delivery(format!(
                "no channel enabled for {} {} notifications",
                user_id, domain
            )));
        }

        let mut report = DispatchReport::default();
        for provider in enabled {
            let adapted = Notification {
                actions: adapt_actions(provider, &notification.actions),
                ..notification.clone()
            };
            match provider.send(user_id, &adapted) {
                Ok(handle) => {
                    tracing::debug!("{} accepted {} notification for {}", provider.name(), domain, user_id);
                    report.handle.receipts.push(DeliveryReceipt {
                        provider: provider.name().to_string(),
                        handle,
                    });
                }
                Err(e) => {
                    tracing::warn!("Channel {} failed for {}: {}", provider.name(), user_id, e);
                    report.failures.push((provider.name().to_string(), e.to_string()));
                }
            }
        }

        if report.handle.is_empty() {
            return Err(Error::Delivery(format!(
                "all {} channel(s) failed for {}",
                report.failures.len(),
                user_id
            )));
        }
        Ok(report)
    }

    /// Best-effort retraction of a previously sent notification
    ///
    /// Providers without removal support are skipped silently; failures are
    /// logged. Returns how many receipts were actually removed.
    pub fn retract(&self, handle: &SentHandle) -> usize {
        let mut removed = 0;
        for receipt in &handle.receipts {
            let Some(provider) = self.providers.iter().find(|p| p.name() == receipt.provider) else {
                tracing::debug!("Channel {} no longer configured, cannot retract", receipt.provider);
                continue;
            };
            if !provider.supports_removal() {
                continue;
            }
            match provider.remove(&receipt.handle) {
                Ok(RemovalOutcome::Removed) => removed += 1,
                Ok(RemovalOutcome::Unsupported) => {}
                Err(e) => tracing::warn!("Failed to retract via {}: {}", receipt.provider, e),
            }
        }
        removed
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording provider shared by the scheduler and control tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug)]
    pub struct Sent {
        pub user_id: String,
        pub notification: Notification,
        pub handle: String,
    }

    #[derive(Clone)]
    pub struct RecordingChannel {
        pub name: String,
        pub actions: Option<usize>,
        pub fail: bool,
        pub removal: bool,
        pub sent: Arc<Mutex<Vec<Sent>>>,
        pub removed: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingChannel {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                actions: Some(10),
                fail: false,
                removal: true,
                sent: Arc::new(Mutex::new(Vec::new())),
                removed: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn failing(name: &str) -> Self {
            Self {
                fail: true,
                ..Self::new(name)
            }
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        pub fn removed(&self) -> Vec<String> {
            self.removed.lock().unwrap().clone()
        }
    }

    impl ChannelProvider for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_enabled(&self, _user_id: &str, _domain: Domain) -> bool {
            true
        }

        fn supports_actions(&self) -> bool {
            self.actions.is_some()
        }

        fn max_actions(&self) -> usize {
            self.actions.unwrap_or(0)
        }

        fn supports_removal(&self) -> bool {
            self.removal
        }

        fn send(&self, user_id: &str, notification: &Notification) -> Result<String> {
            if self.fail {
                return Err(Error::Channel {
                    channel: self.name.clone(),
                    message: "connection refused".into(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            let handle = format!("{}-{}", self.name, sent.len() + 1);
            sent.push(Sent {
                user_id: user_id.to_string(),
                notification: notification.clone(),
                handle: handle.clone(),
            });
            Ok(handle)
        }

        fn remove(&self, handle: &str) -> Result<RemovalOutcome> {
            self.removed.lock().unwrap().push(handle.to_string());
            Ok(RemovalOutcome::Removed)
        }
    }
}
