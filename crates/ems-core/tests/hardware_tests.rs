//! Hardware tests for ems-core.
//!
//! These need a real adapter and a powered companion device in range:
//! ```
//! EMS_DEVICE="A4:C1:38:00:11:22" cargo test --package ems-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use ems_core::{BleTransport, SessionRegistry, SessionState};
use tokio::time::timeout;

/// Upper bound for a full connect, discovery and read.
const BLE_TIMEOUT: Duration = Duration::from_secs(60);

fn get_device() -> Option<String> {
    env::var("EMS_DEVICE").ok().filter(|s| !s.is_empty())
}

fn registry() -> SessionRegistry {
    SessionRegistry::new(Arc::new(BleTransport::new()))
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_lists_named_devices() {
    let registry = registry();
    let result = timeout(BLE_TIMEOUT, registry.scan()).await;

    match result {
        Ok(Ok(devices)) => {
            println!("Found {} named device(s):", devices.len());
            for device in &devices {
                println!(
                    "  - {} ({}) service={}",
                    device.name.as_deref().unwrap_or("?"),
                    device.address,
                    device.advertises_service
                );
                assert!(device.name.is_some());
            }
        }
        Ok(Err(e)) => panic!("Scan failed: {}", e),
        Err(_) => panic!("Scan timed out"),
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_read_networks_from_device() {
    let Some(device) = get_device() else {
        println!("EMS_DEVICE not set, skipping");
        return;
    };
    let registry = registry();

    let networks = timeout(BLE_TIMEOUT, registry.read_networks(&device))
        .await
        .expect("read timed out")
        .expect("read failed");

    println!("Device sees {} network(s):", networks.len());
    for network in networks.iter() {
        println!("  - {network} [{}]", network.signal_quality());
    }

    let session = registry.get(&device).await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);

    registry.shutdown().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_repeated_reads_reuse_session() {
    let Some(device) = get_device() else {
        println!("EMS_DEVICE not set, skipping");
        return;
    };
    let registry = registry();

    let session = registry.connect(&device).await.unwrap();
    for i in 0..3 {
        let result = timeout(BLE_TIMEOUT, session.read_networks()).await;
        match result {
            Ok(Ok(networks)) => println!("Read {}: {} network(s)", i + 1, networks.len()),
            Ok(Err(e)) => panic!("Read {} failed: {}", i + 1, e),
            Err(_) => panic!("Read {} timed out", i + 1),
        }
    }
    assert_eq!(session.attempts(), registry.get(&device).await.unwrap().attempts());

    registry.close(&device).await.unwrap();
}
