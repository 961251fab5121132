use std::collections::BTreeMap;

use netip_types::{RaidZfs, RaidZfsDev};
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Deserialize)]
struct ZpoolList {
    #[serde(default)]
    pools: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Pool {
    name: String,
    state: String,
    vdevs: BTreeMap<String, Vdev>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Vdev {
    name: String,
    vdev_type: String,
    state: String,
    properties: VdevProperties,
    vdevs: BTreeMap<String, Vdev>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VdevProperties {
    size: Option<Property>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Property {
    value: String,
}

fn normalize(state: &str) -> String {
    state.trim().to_lowercase()
}

/// One entry per top-level vdev from `zpool list -vPpj`
pub(crate) fn parse_zpool(json: &str) -> Result<Vec<RaidZfs>> {
    let list: ZpoolList = serde_json::from_str(json)?;
    let mut raids = Vec::new();

    for raw in list.pools.values() {
        let pool: Pool = serde_json::from_value(raw.clone())?;
        let raw = raw.to_string();

        for vdev in pool.vdevs.values() {
            let devs = vdev
                .vdevs
                .values()
                .filter(|d| d.vdev_type == "disk")
                .map(|d| RaidZfsDev {
                    name: d.name.replacen("/dev/", "", 1),
                    state: normalize(&d.state),
                })
                .collect();

            let capacity = vdev
                .properties
                .size
                .as_ref()
                .and_then(|p| p.value.parse().ok())
                .unwrap_or(0);

            raids.push(RaidZfs {
                pool_name: pool.name.clone(),
                pool_state: normalize(&pool.state),
                name: vdev.name.clone(),
                kind: vdev.vdev_type.clone(),
                state: normalize(&vdev.state),
                capacity,
                devs,
                raw: raw.clone(),
            });
        }
    }

    Ok(raids)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZPOOL: &str = r#"{
  "output_version": {"command": "zpool list", "vers_major": 0, "vers_minor": 1},
  "pools": {
    "tank": {
      "name": "tank",
      "type": "POOL",
      "state": "ONLINE",
      "pool_guid": "123",
      "properties": {"size": {"value": "3985729650688", "source": {"type": "NONE", "data": "-"}}},
      "vdevs": {
        "mirror-0": {
          "name": "mirror-0",
          "vdev_type": "mirror",
          "guid": "456",
          "class": "normal",
          "state": "DEGRADED",
          "properties": {"size": {"value": "3985729650688", "source": {"type": "NONE", "data": "-"}}},
          "vdevs": {
            "/dev/sda1": {"name": "/dev/sda1", "vdev_type": "disk", "path": "/dev/sda1", "state": "ONLINE"},
            "/dev/sdb1": {"name": "/dev/sdb1", "vdev_type": "disk", "path": "/dev/sdb1", "state": "FAULTED"},
            "spare-1": {"name": "spare-1", "vdev_type": "spare", "state": "ONLINE"}
          }
        }
      }
    }
  }
}"#;

    #[test]
    fn test_parse_zpool() {
        let raids = parse_zpool(ZPOOL).unwrap();
        assert_eq!(raids.len(), 1);

        let mirror = &raids[0];
        assert_eq!(mirror.pool_name, "tank");
        assert_eq!(mirror.pool_state, "online");
        assert_eq!(mirror.name, "mirror-0");
        assert_eq!(mirror.kind, "mirror");
        assert_eq!(mirror.state, "degraded");
        assert_eq!(mirror.capacity, 3_985_729_650_688);
        assert_eq!(
            mirror.devs,
            vec![
                RaidZfsDev {
                    name: "sda1".to_string(),
                    state: "online".to_string()
                },
                RaidZfsDev {
                    name: "sdb1".to_string(),
                    state: "faulted".to_string()
                },
            ]
        );
        let raw: Value = serde_json::from_str(&mirror.raw).unwrap();
        assert_eq!(raw["pool_guid"], "123");
    }

    #[test]
    fn test_parse_zpool_no_pools() {
        assert!(parse_zpool(r#"{"output_version": {}, "pools": {}}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_zpool_invalid() {
        assert!(parse_zpool("no pools available").is_err());
    }
}
