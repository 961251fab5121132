use std::sync::LazyLock;

use netip_types::SmartDisk;
use regex::Regex;

macro_rules! pattern {
    ($name:ident, $re:literal) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).expect("valid regex"));
    };
}

pattern!(MODEL_FAMILY, r"Model Family:(.*?)\nDevice Model:(.*?)\n");
pattern!(MODEL_NUMBER, r"(?m)Model Number:(.*?)$");
pattern!(DEVICE_MODEL, r"(?m)Device Model:(.*?)$");
pattern!(SERIAL, r"(?m)Serial Number:(.*?)$");
pattern!(USER_CAPACITY, r"(?m)User Capacity:.*\[(.*?)]$");
pattern!(NVM_CAPACITY, r"(?m)Total NVM Capacity:.*\[(.*?)]$");
pattern!(NAMESPACE_CAPACITY, r"(?m)Namespace 1 Size/Capacity:.*\[(.*?)]$");
pattern!(HEALTH_ATA, r"(?m)SMART overall-health self-assessment test result:(.*?)$");
pattern!(HEALTH_SCSI, r"(?m)SMART Health Status:(.*?)$");
pattern!(PERCENT_USED, r"(?m)Percentage Used:(.*%)$");
pattern!(WEAR_231, r"(?m)^\s*231\s+\w+\s+\S+\s+(\d+)\s+");
pattern!(WEAR_233, r"(?m)^\s*233\s+\w+\s+\S+\s+(\d+)\s+");
pattern!(POWER_ON_ATTR, r"(?m)Power_On_Hours\s.*?\s-\s+([\d,]+)");
pattern!(POWER_ON_NVME, r"(?m)Power On Hours:\s*([\d,]+)");
pattern!(TEMP_AIRFLOW, r"(?m)(?:Airflow_Temperature_Cel|Temperature_Case)\s.*?\s-\s+(.*?)\s*$");
pattern!(TEMP_CELSIUS, r"(?m)Temperature_Celsius\s.*?\s-\s+(.*?)\s*$");
pattern!(TEMP_SENSOR, r"Temperature Sensor.*?:(.*)Cel");
pattern!(TEMP_GENERIC, r"Temperature.*?:(.*)Celsius");

fn first_capture(text: &str, patterns: &[&Regex]) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(text))
        .map(|c| c[1].trim().to_string())
}

fn model(text: &str) -> String {
    if let Some(c) = MODEL_FAMILY.captures(text) {
        let family = c[1].trim();
        let device = c[2].trim();
        return if device.is_empty() {
            family.to_string()
        } else {
            format!("{family} ({device})")
        };
    }
    first_capture(text, &[&MODEL_NUMBER, &DEVICE_MODEL]).unwrap_or_default()
}

fn health(text: &str) -> String {
    match first_capture(text, &[&HEALTH_ATA, &HEALTH_SCSI]) {
        Some(h) if h == "PASSED" => "OK".to_string(),
        Some(h) => h.to_uppercase(),
        None => String::new(),
    }
}

/// NVMe reports wear directly; some SATA SSDs expose remaining life as
/// attribute 231 or 233 instead.
fn used(text: &str) -> String {
    if let Some(used) = first_capture(text, &[&PERCENT_USED]) {
        return used;
    }
    let remaining = WEAR_231
        .captures(text)
        .or_else(|| WEAR_233.captures(text))
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|v| *v <= 100);
    remaining.map_or_else(String::new, |v| format!("{}%", 100 - v))
}

fn working_seconds(text: &str) -> i64 {
    first_capture(text, &[&POWER_ON_ATTR, &POWER_ON_NVME])
        .and_then(|hours| hours.replace(',', "").parse::<i64>().ok())
        .map_or(0, |hours| hours * 3600)
}

fn temperature(text: &str) -> String {
    if let Some(t) = first_capture(text, &[&TEMP_AIRFLOW, &TEMP_CELSIUS]) {
        return t.replacen("Min/Max ", "", 1);
    }

    let sensors: Vec<String> = TEMP_SENSOR
        .captures_iter(text)
        .enumerate()
        .map(|(i, c)| format!("#{i}: {}", c[1].trim()))
        .collect();
    if !sensors.is_empty() {
        return sensors.join(" | ");
    }

    first_capture(text, &[&TEMP_GENERIC]).unwrap_or_default()
}

/// Extract the summary fields from `smartctl --all` output
pub(crate) fn parse_smart(text: &str) -> SmartDisk {
    SmartDisk {
        model: model(text),
        serial: first_capture(text, &[&SERIAL]).unwrap_or_default(),
        capacity: first_capture(text, &[&USER_CAPACITY, &NVM_CAPACITY, &NAMESPACE_CAPACITY])
            .unwrap_or_default(),
        health: health(text),
        used: used(text),
        working: working_seconds(text),
        temperature: temperature(text),
        full: text.to_string(),
        error: String::new(),
    }
}
