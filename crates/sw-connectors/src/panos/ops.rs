//! Operational commands and their answers.

use crate::traits::{ConnectorError, ConnectorResult};
use serde_json::Value;
use sw_core::shadow::{as_list, text_of};
use sw_core::{DeviceGroup, HaState, ShadowTarget};

pub const SHOW_HA_STATE: &str = "<show><high-availability><state></state></high-availability></show>";
pub const SHOW_DEVICE_GROUPS: &str = "<show><devicegroups></devicegroups></show>";
pub const SHOW_SYSTEM_INFO: &str = "<show><system><info></info></system></show>";

/// Decodes `show high-availability state`.
pub fn parse_ha_state(result: &Value) -> ConnectorResult<HaState> {
    match result.get("enabled").and_then(text_of) {
        Some("no") => return Ok(HaState::Disabled),
        Some("yes") => {}
        _ => {
            return Err(ConnectorError::InvalidResponse(format!(
                "HA state without 'enabled' flag: {}",
                result
            )))
        }
    }
    result
        .pointer("/group/local-info/state")
        .and_then(text_of)
        .map(HaState::from_local_state)
        .ok_or_else(|| {
            ConnectorError::InvalidResponse(format!("HA state without local state: {}", result))
        })
}

/// Decodes `show devicegroups` into device groups and their device serials.
pub fn parse_device_groups(result: &Value) -> ConnectorResult<Vec<DeviceGroup>> {
    let groups = result.get("devicegroups").ok_or_else(|| {
        ConnectorError::InvalidResponse(format!("missing devicegroups: {}", result))
    })?;

    let mut out = Vec::new();
    for entry in as_list(groups.get("entry").unwrap_or(&Value::Null)) {
        let name = entry_name(entry)?;
        let targets = entry
            .get("devices")
            .and_then(|d| d.get("entry"))
            .map(|devices| {
                as_list(devices)
                    .into_iter()
                    .filter_map(|d| d.get("@name").and_then(Value::as_str))
                    .map(|serial| ShadowTarget::Device(serial.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        out.push(DeviceGroup {
            name: name.to_string(),
            targets,
        });
    }
    Ok(out)
}

/// Decodes a config `get` of the vsys list into one device group per vsys.
pub fn parse_vsys(result: &Value) -> ConnectorResult<Vec<DeviceGroup>> {
    let entries = result
        .get("vsys")
        .and_then(|v| v.get("entry"))
        .or_else(|| result.get("entry"))
        .unwrap_or(&Value::Null);

    as_list(entries)
        .into_iter()
        .map(|entry| -> ConnectorResult<DeviceGroup> {
            let name = entry_name(entry)?;
            Ok(DeviceGroup {
                name: name.to_string(),
                targets: vec![ShadowTarget::Vsys(name.to_string())],
            })
        })
        .collect()
}

fn entry_name(entry: &Value) -> ConnectorResult<&str> {
    entry
        .get("@name")
        .and_then(Value::as_str)
        .ok_or_else(|| ConnectorError::InvalidResponse(format!("entry without name: {}", entry)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ha_disabled() {
        assert_eq!(
            parse_ha_state(&json!({"enabled": "no"})).unwrap(),
            HaState::Disabled
        );
    }

    #[test]
    fn test_ha_local_state() {
        let result = json!({
            "enabled": "yes",
            "group": {"local-info": {"state": "primary-passive"}, "peer-info": {"state": "primary-active"}}
        });
        assert_eq!(parse_ha_state(&result).unwrap(), HaState::Passive);

        let result = json!({"enabled": "yes", "group": {"local-info": {"state": "active"}}});
        assert_eq!(parse_ha_state(&result).unwrap(), HaState::Active);
    }

    #[test]
    fn test_ha_malformed() {
        assert!(parse_ha_state(&Value::Null).is_err());
        assert!(parse_ha_state(&json!({"enabled": "yes"})).is_err());
    }

    #[test]
    fn test_device_groups() {
        let result = json!({
            "devicegroups": {"entry": [
                {"@name": "DG-Branch", "devices": {"entry": [
                    {"@name": "007951000123456", "connected": "yes"},
                    {"@name": "007951000654321", "connected": "no"}
                ]}},
                {"@name": "DG-Empty", "devices": null}
            ]}
        });
        let groups = parse_device_groups(&result).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "DG-Branch");
        assert_eq!(
            groups[0].targets,
            vec![
                ShadowTarget::Device("007951000123456".to_string()),
                ShadowTarget::Device("007951000654321".to_string())
            ]
        );
        assert!(groups[1].targets.is_empty());
    }

    #[test]
    fn test_single_device_group() {
        let result = json!({
            "devicegroups": {"entry": {"@name": "DG", "devices": {"entry": {"@name": "001"}}}}
        });
        let groups = parse_device_groups(&result).unwrap();
        assert_eq!(groups[0].targets, vec![ShadowTarget::Device("001".to_string())]);
    }

    #[test]
    fn test_vsys_list() {
        let result = json!({"vsys": {"entry": [{"@name": "vsys1"}, {"@name": "vsys2"}]}});
        let groups = parse_vsys(&result).unwrap();
        assert_eq!(groups[1].name, "vsys2");
        assert_eq!(groups[1].targets, vec![ShadowTarget::Vsys("vsys2".to_string())]);
    }
}
