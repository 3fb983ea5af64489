use std::sync::Arc;

use meross_cloud::message::{toggle_x_payload, Method, NAMESPACE_TOGGLE_X};
use meross_cloud::{BridgeStatus, MerossBridge};
use meross_core::config::ConfigBuilder;
use meross_core::logging;

use tracing::info;

/// Sign in, list the account's devices and switch one of them
///
/// Usage: `toggle_plug [config-file] <device-name> <on|off>`. Account settings
/// can also come from `MEROSS__BRIDGE__USER_EMAIL` and friends.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_file = if args.len() > 2 {
        args.remove(0)
    } else {
        "meross.toml".to_string()
    };
    let device_name = args.first().cloned().unwrap_or_else(|| "Lamp".to_string());
    let on = args.get(1).map(|s| s == "on").unwrap_or(true);

    let config = ConfigBuilder::new()
        .with_config_file(&config_file)
        .with_environment_prefix("MEROSS")
        .build()?;
    logging::init_from_config(&config.logging)?;

    let bridge = MerossBridge::initialize(
        &config,
        Arc::new(|status: BridgeStatus| info!(?status, "Bridge status changed")),
    )
    .await?;

    for device in bridge.read_devices().await? {
        info!(
            name = %device.dev_name,
            uuid = %device.uuid,
            online = device.is_online(),
            "Found device"
        );
    }

    let reply = bridge
        .send_command(&device_name, Method::Set, NAMESPACE_TOGGLE_X, toggle_x_payload(0, on))
        .await?;
    if reply.is_empty() {
        info!("No reply from {}", device_name);
    } else {
        info!("Reply from {}: {}", device_name, reply);
    }

    Ok(())
}
