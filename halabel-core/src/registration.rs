//! Host-facing service registration interface

use async_trait::async_trait;

use crate::labels::HaField;

/// Receives HA state changes from the host process.
///
/// Each call is independent of the others; implementations must not assume
/// any ordering between fields.
#[async_trait]
pub trait ServiceRegistration: Send + Sync {
    /// Error returned when a change cannot be recorded
    type Error: std::error::Error + Send + Sync + 'static;

    /// The process became, or stopped being, the active leader
    async fn notify_active_state_change(&self, is_active: bool) -> Result<(), Self::Error>;

    /// The process was sealed or unsealed
    async fn notify_sealed_state_change(&self, is_sealed: bool) -> Result<(), Self::Error>;

    /// The process became, or stopped being, a performance standby
    async fn notify_performance_standby_state_change(
        &self,
        is_standby: bool,
    ) -> Result<(), Self::Error>;

    /// The process was initialized
    async fn notify_initialized_state_change(
        &self,
        is_initialized: bool,
    ) -> Result<(), Self::Error>;

    /// Dispatch a change by field
    async fn notify(&self, field: HaField, value: bool) -> Result<(), Self::Error> {
        match field {
            HaField::Active => self.notify_active_state_change(value).await,
            HaField::Sealed => self.notify_sealed_state_change(value).await,
            HaField::PerformanceStandby => {
                self.notify_performance_standby_state_change(value).await
            }
            HaField::Initialized => self.notify_initialized_state_change(value).await,
        }
    }
}
