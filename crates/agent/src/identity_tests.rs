// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{load_or_create_machine_id, HardwareFacts};

#[test]
fn machine_id_is_stable_across_loads() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let first = load_or_create_machine_id(dir.path())?;
    let second = load_or_create_machine_id(dir.path())?;
    assert_eq!(first, second);
    assert!(!first.is_empty());
    Ok(())
}

#[test]
fn machine_id_survives_trailing_whitespace() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("machine_id"), "m-001\n")?;
    assert_eq!(load_or_create_machine_id(dir.path())?, "m-001");
    Ok(())
}

#[test]
fn empty_file_is_regenerated() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("machine_id"), "")?;
    let id = load_or_create_machine_id(dir.path())?;
    assert!(!id.is_empty());
    Ok(())
}

#[test]
fn compose_joins_present_fields() {
    let facts = HardwareFacts {
        cpu_model: Some("Example CPU".to_owned()),
        disk_serial: Some("WD-123".to_owned()),
        motherboard_uuid: Some("uuid-1".to_owned()),
        mac_addresses: vec!["aa:bb".to_owned(), "cc:dd".to_owned()],
    };
    assert_eq!(facts.compose(), "Example CPU|WD-123|uuid-1|aa:bb|cc:dd");
}

#[test]
fn missing_fields_are_omitted_not_substituted() {
    let facts = HardwareFacts {
        cpu_model: Some("Example CPU".to_owned()),
        disk_serial: None,
        motherboard_uuid: None,
        mac_addresses: vec!["aa:bb".to_owned()],
    };
    assert_eq!(facts.compose(), "Example CPU|aa:bb");

    let empty = HardwareFacts::default();
    assert_eq!(empty.compose(), "");
}

#[test]
fn fingerprint_is_hex_sha256() {
    let facts = HardwareFacts {
        cpu_model: Some("Example CPU".to_owned()),
        disk_serial: None,
        motherboard_uuid: None,
        mac_addresses: vec![],
    };
    let fp = facts.fingerprint();
    assert_eq!(fp.len(), 64);
    assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));

    // Distinct inputs diverge.
    let other = HardwareFacts { cpu_model: Some("Other CPU".to_owned()), ..Default::default() };
    assert_ne!(fp, other.fingerprint());
}

#[test]
fn fingerprint_is_deterministic() {
    let facts = HardwareFacts {
        cpu_model: Some("Example CPU".to_owned()),
        disk_serial: Some("WD-123".to_owned()),
        motherboard_uuid: None,
        mac_addresses: vec!["aa:bb".to_owned()],
    };
    assert_eq!(facts.fingerprint(), facts.fingerprint());
}
