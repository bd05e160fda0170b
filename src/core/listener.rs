//! Service discovery and notification setup on the control characteristic
//!
//! Discovery succeeds -> read control characteristic -> enable notifications
//! through its configuration descriptor -> decode every value change as text.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{
    error::SessionError,
    profile::{CCCD_UUID, CONTROL_CHAR_UUID, LOCK_SERVICE_UUID},
    types::{CharacteristicCommand, CharacteristicOperation, GattService, GattStatus},
};

/// Locate the control characteristic and produce the initial read
pub fn on_services_discovered(
    status: GattStatus,
    services: &[GattService],
) -> Result<CharacteristicCommand, SessionError> {
    if !status.is_success() {
        return Err(SessionError::ServiceDiscoveryFailed(format!(
            "status {status}"
        )));
    }

    let service = services
        .iter()
        .find(|s| s.uuid == LOCK_SERVICE_UUID)
        .ok_or_else(|| {
            SessionError::ServiceDiscoveryFailed(format!("service {LOCK_SERVICE_UUID} missing"))
        })?;

    if !service.characteristics.contains(&CONTROL_CHAR_UUID) {
        return Err(SessionError::ServiceDiscoveryFailed(format!(
            "characteristic {CONTROL_CHAR_UUID} missing"
        )));
    }

    debug!("Control characteristic located");
    Ok(CharacteristicCommand {
        operation: CharacteristicOperation::Read,
        characteristic_id: CONTROL_CHAR_UUID,
    })
}

/// After the initial read, ask for notifications on the same characteristic
pub fn on_characteristic_read(
    characteristic: Uuid,
    status: GattStatus,
    value: &[u8],
) -> Option<CharacteristicCommand> {
    if characteristic != CONTROL_CHAR_UUID {
        return None;
    }

    if !status.is_success() {
        warn!(%status, "Control characteristic read failed");
        return None;
    }

    debug!(value = %decode(value), "Control characteristic read");
    Some(CharacteristicCommand {
        operation: CharacteristicOperation::EnableNotify,
        characteristic_id: CONTROL_CHAR_UUID,
    })
}

/// Whether a descriptor write completion means notifications are now active
pub fn notifications_enabled(descriptor: Uuid, status: GattStatus) -> bool {
    if descriptor != CCCD_UUID {
        return false;
    }

    if !status.is_success() {
        warn!(%status, "Enabling notifications failed");
        return false;
    }

    true
}

/// Decode a value-change payload from the control characteristic
pub fn decode_notification(characteristic: Uuid, value: &[u8]) -> Option<String> {
    (characteristic == CONTROL_CHAR_UUID).then(|| decode(value))
}

fn decode(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lock_profile() -> Vec<GattService> {
        vec![
            GattService {
                uuid: Uuid::from_u128(0x1800),
                characteristics: vec![Uuid::from_u128(0x2a00)],
            },
            GattService {
                uuid: LOCK_SERVICE_UUID,
                characteristics: vec![CONTROL_CHAR_UUID],
            },
        ]
    }

    #[test]
    fn test_discovery_success_reads_control() {
        let command = on_services_discovered(GattStatus::SUCCESS, &lock_profile()).unwrap();
        assert_eq!(
            command,
            CharacteristicCommand {
                operation: CharacteristicOperation::Read,
                characteristic_id: CONTROL_CHAR_UUID,
            }
        );
    }

    #[test]
    fn test_discovery_failure_status() {
        let err = on_services_discovered(GattStatus::FAILURE, &lock_profile()).unwrap_err();
        assert!(matches!(err, SessionError::ServiceDiscoveryFailed(_)));
    }

    #[test]
    fn test_discovery_missing_service() {
        let services = vec![GattService {
            uuid: Uuid::from_u128(0x1800),
            characteristics: vec![],
        }];
        assert!(on_services_discovered(GattStatus::SUCCESS, &services).is_err());
    }

    #[test]
    fn test_discovery_missing_characteristic() {
        let services = vec![GattService {
            uuid: LOCK_SERVICE_UUID,
            characteristics: vec![Uuid::from_u128(0x2a19)],
        }];
        assert!(on_services_discovered(GattStatus::SUCCESS, &services).is_err());
    }

    #[test]
    fn test_read_enables_notify() {
        let command = on_characteristic_read(CONTROL_CHAR_UUID, GattStatus::SUCCESS, b"locked");
        assert_eq!(
            command.map(|c| c.operation),
            Some(CharacteristicOperation::EnableNotify)
        );

        assert!(on_characteristic_read(CONTROL_CHAR_UUID, GattStatus::FAILURE, b"").is_none());
        assert!(
            on_characteristic_read(Uuid::from_u128(0x2a19), GattStatus::SUCCESS, b"").is_none()
        );
    }

    #[test]
    fn test_descriptor_write_completion() {
        assert!(notifications_enabled(CCCD_UUID, GattStatus::SUCCESS));
        assert!(!notifications_enabled(CCCD_UUID, GattStatus::FAILURE));
        assert!(!notifications_enabled(
            Uuid::from_u128(0x2902),
            GattStatus::SUCCESS
        ));
    }

    #[test]
    fn test_decode_notification() {
        assert_eq!(
            decode_notification(CONTROL_CHAR_UUID, b"unlocked"),
            Some("unlocked".to_string())
        );
        assert_eq!(
            decode_notification(CONTROL_CHAR_UUID, &[0x6f, 0xff, 0x6b]),
            Some("o\u{fffd}k".to_string())
        );
        assert_eq!(decode_notification(Uuid::from_u128(0x2a19), b"x"), None);
    }
}
