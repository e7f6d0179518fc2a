// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{Capability, PlatformAdapter};

#[test]
fn host_default_has_process_level_capabilities() {
    let adapter = PlatformAdapter::host_default();
    assert!(adapter.has(Capability::Shell));
    assert!(adapter.has(Capability::Fs));
    assert!(adapter.has(Capability::Credentials));
    assert!(adapter.has(Capability::Net));
}

#[test]
fn gui_capabilities_absent_by_default() {
    let adapter = PlatformAdapter::host_default();
    assert!(!adapter.has(Capability::ScreenCapture));
    assert!(!adapter.has(Capability::InputInject));
    assert!(!adapter.has(Capability::Clipboard));
    assert!(!adapter.has(Capability::Window));
}

#[test]
fn missing_lists_absent_names() {
    let adapter = PlatformAdapter::host_default();
    let missing = adapter.missing(&[
        Capability::Shell,
        Capability::ScreenCapture,
        Capability::InputInject,
    ]);
    assert_eq!(missing, vec![Capability::ScreenCapture, Capability::InputInject]);
}

#[test]
fn available_preserves_declaration_order() {
    let adapter = PlatformAdapter::host_default();
    let available = adapter.available();
    assert_eq!(
        available,
        vec![Capability::Fs, Capability::Shell, Capability::Credentials, Capability::Net]
    );
}

#[test]
fn capability_names_roundtrip() -> anyhow::Result<()> {
    let json = serde_json::to_string(&Capability::ScreenCapture)?;
    assert_eq!(json, "\"screen.capture\"");
    let cap: Capability = serde_json::from_str("\"input.inject\"")?;
    assert_eq!(cap, Capability::InputInject);
    Ok(())
}
