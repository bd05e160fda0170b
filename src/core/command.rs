//! Lock/unlock command channel

use serde::{Deserialize, Serialize};

use crate::core::{
    error::{CommandError, CommandResult},
    profile::{CONTROL_CHAR_UUID, LOCK_PAYLOAD, UNLOCK_PAYLOAD},
    types::{CharacteristicCommand, CharacteristicOperation, SessionStatus, TransportHandle},
};

/// User-initiated command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockCommand {
    Lock,
    Unlock,
}

impl LockCommand {
    /// One-byte payload written to the control characteristic
    pub fn payload(self) -> u8 {
        match self {
            LockCommand::Lock => LOCK_PAYLOAD,
            LockCommand::Unlock => UNLOCK_PAYLOAD,
        }
    }
}

impl std::fmt::Display for LockCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockCommand::Lock => f.write_str("lock"),
            LockCommand::Unlock => f.write_str("unlock"),
        }
    }
}

/// Gate a command on the session state and map it to its single write
///
/// Overlapping writes are not serialized here; ordering is left to the
/// platform queue.
pub fn prepare(
    status: SessionStatus,
    handle: Option<TransportHandle>,
    command: LockCommand,
) -> CommandResult<(TransportHandle, CharacteristicCommand)> {
    let handle = match (status, handle) {
        (SessionStatus::Ready, Some(handle)) => handle,
        _ => return Err(CommandError::NotConnected),
    };

    Ok((
        handle,
        CharacteristicCommand {
            operation: CharacteristicOperation::Write(vec![command.payload()]),
            characteristic_id: CONTROL_CHAR_UUID,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payloads() {
        assert_eq!(LockCommand::Lock.payload(), 0x00);
        assert_eq!(LockCommand::Unlock.payload(), 0x01);
    }

    #[test]
    fn test_prepare_when_ready() {
        let (handle, write) =
            prepare(SessionStatus::Ready, Some(TransportHandle(7)), LockCommand::Unlock).unwrap();

        assert_eq!(handle, TransportHandle(7));
        assert_eq!(write.characteristic_id, CONTROL_CHAR_UUID);
        assert_eq!(write.operation, CharacteristicOperation::Write(vec![0x01]));
    }

    #[test]
    fn test_prepare_rejects_non_ready_states() {
        for status in [
            SessionStatus::Disconnected,
            SessionStatus::Scanning,
            SessionStatus::Connecting,
            SessionStatus::Connected,
        ] {
            assert_eq!(
                prepare(status, Some(TransportHandle(1)), LockCommand::Lock),
                Err(CommandError::NotConnected)
            );
        }
    }

    #[test]
    fn test_prepare_without_handle() {
        assert_eq!(
            prepare(SessionStatus::Ready, None, LockCommand::Lock),
            Err(CommandError::NotConnected)
        );
    }
}
