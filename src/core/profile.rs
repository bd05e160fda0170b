//! Fixed GATT profile of the lock peripheral

use uuid::Uuid;

/// Lock service UUID
pub const LOCK_SERVICE_UUID: Uuid = Uuid::from_u128(0x55725ac1_066c_48b5_8700_2d9fb3603c5e);

/// Control characteristic (commands written, state notified)
pub const CONTROL_CHAR_UUID: Uuid = Uuid::from_u128(0x69ddb59c_d601_4ea4_ba83_44f679a670ba);

/// Client characteristic configuration descriptor of the control characteristic
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x293b9662_ec56_7167_8c3c_df51316e7ed8);

/// Descriptor value that turns notifications on
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Control payload that locks
pub const LOCK_PAYLOAD: u8 = 0x00;

/// Control payload that unlocks
pub const UNLOCK_PAYLOAD: u8 = 0x01;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            LOCK_SERVICE_UUID.to_string(),
            "55725ac1-066c-48b5-8700-2d9fb3603c5e"
        );
        assert_eq!(
            CONTROL_CHAR_UUID.to_string(),
            "69ddb59c-d601-4ea4-ba83-44f679a670ba"
        );
        assert_eq!(CCCD_UUID.to_string(), "293b9662-ec56-7167-8c3c-df51316e7ed8");
    }

    #[test]
    fn test_payloads_differ() {
        assert_ne!(LOCK_PAYLOAD, UNLOCK_PAYLOAD);
    }
}
