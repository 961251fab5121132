use std::path::{Path, PathBuf};

use netip_types::TempStat;

use crate::paths::{HostPaths, read_trimmed};

/// One `tempN_input` file with its static attributes
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Sensor {
    input: PathBuf,
    label: String,
    max: Option<f64>,
    crit: Option<f64>,
}

/// Millidegrees to degrees, rounded to a tenth
fn degrees(raw: &str) -> Option<f64> {
    let milli: i64 = raw.trim().parse().ok()?;
    #[allow(clippy::cast_precision_loss)]
    Some((milli as f64 / 100.0).round() / 10.0)
}

fn sensor_label(id: &str, chip: Option<&str>, label: Option<&str>) -> String {
    let mut parts = vec![format!("hwm{id}")];
    if let Some(chip) = chip.map(str::to_lowercase).filter(|c| !c.is_empty()) {
        let trimmed = chip.strip_suffix("temp").unwrap_or(&chip);
        parts.push(if trimmed.is_empty() { chip.clone() } else { trimmed.to_string() });
    }
    if let Some(label) = label.map(str::to_lowercase).filter(|l| !l.is_empty()) {
        parts.push(label);
    }
    parts.join(" ")
}

fn chip_sensors(dir: &Path, id: &str) -> Vec<Sensor> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let chip = read_trimmed(&dir.join("name"));

    let mut sensors: Vec<Sensor> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let file = entry.file_name().to_string_lossy().into_owned();
            let n = file.strip_prefix("temp")?.strip_suffix("_input")?;
            if n.is_empty() {
                return None;
            }
            let attr = |suffix: &str| dir.join(format!("temp{n}_{suffix}"));

            Some(Sensor {
                input: entry.path(),
                label: sensor_label(id, chip.as_deref(), read_trimmed(&attr("label")).as_deref()),
                max: read_trimmed(&attr("max")).as_deref().and_then(degrees),
                crit: read_trimmed(&attr("crit")).as_deref().and_then(degrees),
            })
        })
        .collect();
    sensors.sort_by(|a, b| a.input.cmp(&b.input));
    sensors
}

/// Enumerate hwmon temperature inputs. Done once; the set is static.
pub(crate) fn discover(paths: &HostPaths) -> Vec<Sensor> {
    let Ok(entries) = std::fs::read_dir(paths.hwmon()) else {
        return Vec::new();
    };

    let mut chips: Vec<(String, PathBuf)> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let id = name.strip_prefix("hwmon")?;
            if id.is_empty() {
                tracing::debug!("Skipping hwmon entry without id: {}", name);
                return None;
            }
            Some((id.to_string(), entry.path()))
        })
        .collect();
    chips.sort();

    chips
        .iter()
        .flat_map(|(id, dir)| chip_sensors(dir, id))
        .collect()
}

/// Current readings; unreadable inputs are skipped
pub(crate) fn read(sensors: &[Sensor]) -> Vec<TempStat> {
    sensors
        .iter()
        .filter_map(|sensor| {
            let temp = read_trimmed(&sensor.input).as_deref().and_then(degrees)?;
            Some(TempStat {
                label: sensor.label.clone(),
                temp,
                max: sensor.max,
                crit: sensor.crit,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;

    fn write(dir: &Path, name: &str, value: &str) {
        std::fs::write(dir.join(name), value).unwrap();
    }

    #[test]
    fn test_degrees() {
        assert_eq!(degrees("45000\n"), Some(45.0));
        assert_eq!(degrees("45678"), Some(45.7));
        assert_eq!(degrees("-5000"), Some(-5.0));
        assert_eq!(degrees("n/a"), None);
    }

    #[test]
    fn test_sensor_label() {
        assert_eq!(
            sensor_label("0", Some("coretemp"), Some("Package id 0")),
            "hwm0 core package id 0"
        );
        assert_eq!(sensor_label("2", Some("temp"), None), "hwm2 temp");
        assert_eq!(sensor_label("1", Some("nvme"), None), "hwm1 nvme");
        assert_eq!(sensor_label("3", None, Some("Composite")), "hwm3 composite");
    }

    #[test]
    fn test_discover_and_read() {
        let root = tempfile::tempdir().unwrap();
        let paths = HostPaths::rooted(root.path());
        let chip = paths.hwmon().join("hwmon0");
        std::fs::create_dir_all(&chip).unwrap();
        write(&chip, "name", "coretemp\n");
        write(&chip, "temp1_input", "52000\n");
        write(&chip, "temp1_label", "Package id 0\n");
        write(&chip, "temp1_max", "80000\n");
        write(&chip, "temp1_crit", "100000\n");
        write(&chip, "temp2_input", "48500\n");
        std::fs::create_dir_all(paths.hwmon().join("hwmon")).unwrap();

        let sensors = discover(&paths);
        assert_eq!(sensors.len(), 2);

        let stats = read(&sensors);
        assert_eq!(
            stats[0],
            TempStat {
                label: "hwm0 core package id 0".to_string(),
                temp: 52.0,
                max: Some(80.0),
                crit: Some(100.0),
            }
        );
        assert_eq!(stats[1].label, "hwm0 core");
        assert_eq!(stats[1].temp, 48.5);
        assert_eq!(stats[1].max, None);

        std::fs::remove_file(chip.join("temp2_input")).unwrap();
        assert_eq!(read(&sensors).len(), 1);
    }

    #[test]
    fn test_discover_without_hwmon() {
        let root = tempfile::tempdir().unwrap();
        assert!(discover(&HostPaths::rooted(root.path())).is_empty());
    }
}
