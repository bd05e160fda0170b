//! Command-line argument parsing

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "ble-lock-controller", version, author)]
#[clap(about = "BLE lock controller with a JSON-RPC control socket")]
pub struct CliArgs {
    /// Advertised name of the lock peripheral
    #[clap(short, long, default_value = "MyBLEDevice")]
    pub device_name: String,

    /// Bluetooth adapter name (e.g. hci0), default adapter if omitted
    #[clap(short, long)]
    pub adapter: Option<String>,

    /// Scan timeout in milliseconds
    #[clap(long, default_value = "3000")]
    pub scan_timeout_ms: u64,

    /// Delay between a scan match and the first connect request, in milliseconds
    #[clap(long, default_value = "500")]
    pub settle_delay_ms: u64,

    /// Window for retrying unreachable-device failures, in milliseconds
    #[clap(long, default_value = "5000")]
    pub connect_deadline_ms: u64,

    /// Let the platform re-establish dropped links on its own
    #[clap(long)]
    pub auto_reconnect: bool,

    /// Secret shared with control clients allowed to lock and unlock
    #[clap(short = 's', long)]
    pub secret: Option<String>,

    /// Path for Unix socket
    #[clap(long, default_value = "/run/ble-lock-controller.sock")]
    pub socket_path: String,

    /// Socket file permissions (octal, e.g., 660)
    #[clap(long, default_value = "660")]
    pub socket_mode: String,

    /// Start scanning for the device immediately
    #[clap(long)]
    pub connect_on_start: bool,
}
