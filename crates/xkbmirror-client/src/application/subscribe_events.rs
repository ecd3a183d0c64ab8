//! The notification filter: one acknowledged registration of interest.
//!
//! Computing *what* to subscribe to is pure (`SubscriptionSpec::required()`
//! in the core crate); this module performs the single registration request
//! against the server.  The request happens exactly once, during
//! initialization, after the first keymap build.  A rejection is fatal to
//! the whole session and is never retried — a client that cannot register
//! for change notifications would go silently stale.

use thiserror::Error;

use xkbmirror_core::{DeviceId, EventCategorySet, MapPartSet, SubscriptionSpec};

/// Error type for a failed subscription request.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("server rejected notification selection for device {device}: {reason}")]
    Rejected { device: DeviceId, reason: String },
}

/// Capability contract for registering notification interest at the server.
///
/// The single operation is a checked request: it returns only after the
/// server acknowledged or rejected the registration.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSubscriber {
    /// Registers interest in `categories` for `device`, with `parts`
    /// selecting which keymap parts count as a map change.
    fn select_notifications(
        &self,
        device: DeviceId,
        categories: EventCategorySet,
        parts: MapPartSet,
    ) -> Result<(), String>;
}

/// Subscribes `device` to the minimal notification set a mirror needs.
///
/// # Errors
///
/// Returns [`SubscribeError::Rejected`] if the server refuses the
/// registration (malformed request, unsupported device).  Fatal to
/// initialization; not retried.
pub fn subscribe_keyboard<S>(server: &S, device: DeviceId) -> Result<(), SubscribeError>
where
    S: NotificationSubscriber + ?Sized,
{
    let spec = SubscriptionSpec::required();
    server
        .select_notifications(device, spec.categories, spec.map_parts)
        .map_err(|reason| SubscribeError::Rejected { device, reason })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_subscribe_sends_exactly_the_required_sets_once() {
        // Arrange
        let spec = SubscriptionSpec::required();
        let mut server = MockNotificationSubscriber::new();
        server
            .expect_select_notifications()
            .with(eq(DeviceId(0)), eq(spec.categories), eq(spec.map_parts))
            .times(1)
            .returning(|_, _, _| Ok(()));

        // Act / Assert
        subscribe_keyboard(&server, DeviceId(0)).expect("subscription must succeed");
    }

    #[test]
    fn test_rejection_is_reported_with_device_and_reason() {
        // Arrange
        let mut server = MockNotificationSubscriber::new();
        server
            .expect_select_notifications()
            .returning(|_, _, _| Err("unsupported device".to_string()));

        // Act
        let err = subscribe_keyboard(&server, DeviceId(3)).unwrap_err();

        // Assert
        let SubscribeError::Rejected { device, reason } = err;
        assert_eq!(device, DeviceId(3));
        assert_eq!(reason, "unsupported device");
    }
}
