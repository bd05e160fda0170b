//! Runtime settings

use std::time::Duration;

use crate::{config::CliArgs, core::types::SessionConfig};

/// Runtime configuration settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub device_name: String,
    pub adapter: Option<String>,
    pub session: SessionConfig,
    pub secret: Option<String>,
    pub socket_path: String,
    pub socket_mode: u32,
    pub connect_on_start: bool,
}

impl From<CliArgs> for Settings {
    fn from(args: CliArgs) -> Self {
        // Parse octal socket mode
        let socket_mode = u32::from_str_radix(&args.socket_mode, 8).unwrap_or(0o660);

        Settings {
            device_name: args.device_name,
            adapter: args.adapter,
            session: SessionConfig {
                scan_timeout: Duration::from_millis(args.scan_timeout_ms),
                settle_delay: Duration::from_millis(args.settle_delay_ms),
                connect_deadline: Duration::from_millis(args.connect_deadline_ms),
                auto_reconnect: args.auto_reconnect,
            },
            secret: args.secret,
            socket_path: args.socket_path,
            socket_mode,
            connect_on_start: args.connect_on_start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_match_session_defaults() {
        let args = CliArgs::parse_from(["ble-lock-controller"]);
        let settings = Settings::from(args);

        assert_eq!(settings.device_name, "MyBLEDevice");
        assert_eq!(settings.session, SessionConfig::default());
        assert_eq!(settings.socket_mode, 0o660);
        assert!(settings.secret.is_none());
        assert!(!settings.connect_on_start);
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::parse_from([
            "ble-lock-controller",
            "--device-name",
            "FrontDoor",
            "--adapter",
            "hci1",
            "--connect-deadline-ms",
            "8000",
            "--auto-reconnect",
            "--socket-mode",
            "600",
            "--secret",
            "s3cret",
        ]);
        let settings = Settings::from(args);

        assert_eq!(settings.device_name, "FrontDoor");
        assert_eq!(settings.adapter.as_deref(), Some("hci1"));
        assert_eq!(settings.session.connect_deadline, Duration::from_millis(8000));
        assert!(settings.session.auto_reconnect);
        assert_eq!(settings.socket_mode, 0o600);
        assert_eq!(settings.secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_invalid_socket_mode_falls_back() {
        let args = CliArgs::parse_from(["ble-lock-controller", "--socket-mode", "rw"]);
        assert_eq!(Settings::from(args).socket_mode, 0o660);
    }
}
