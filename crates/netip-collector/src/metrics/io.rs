use std::collections::{BTreeMap, HashMap};

use netip_types::IoStat;

use crate::paths::HostPaths;

/// Cumulative counters from one `/proc/diskstats` line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    read_ios: i64,
    read_kb: i64,
    read_ticks: i64,
    write_ios: i64,
    write_kb: i64,
    write_ticks: i64,
    discard_ios: i64,
    discard_kb: i64,
    discard_ticks: i64,
    busy_centis: i64,
}

impl Counters {
    fn parse(line: &str) -> Option<(String, Self)> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 14 {
            return None;
        }
        let num = |i: usize| -> i64 { fields.get(i).and_then(|f| f.parse().ok()).unwrap_or(0) };

        let counters = Self {
            read_ios: num(3),
            read_kb: num(5) / 2,
            read_ticks: num(6),
            write_ios: num(7),
            write_kb: num(9) / 2,
            write_ticks: num(10),
            busy_centis: num(12) / 10,
            discard_ios: num(14),
            discard_kb: num(16) / 2,
            discard_ticks: num(17),
        };
        Some((fields[2].to_string(), counters))
    }

    fn total_ios(&self) -> i64 {
        self.read_ios + self.write_ios + self.discard_ios
    }

    fn delta(&self, prev: &Self) -> IoStat {
        let await_ms = |ticks: i64, prev_ticks: i64, iops: i64| {
            if iops > 0 { (ticks - prev_ticks) / iops } else { 0 }
        };

        let read_iops = self.read_ios - prev.read_ios;
        let write_iops = self.write_ios - prev.write_ios;
        let discard_iops = self.discard_ios - prev.discard_ios;

        IoStat {
            read_iops,
            write_iops,
            discard_iops,
            read_kbs: self.read_kb - prev.read_kb,
            write_kbs: self.write_kb - prev.write_kb,
            discard_kbs: self.discard_kb - prev.discard_kb,
            await_read_ms: await_ms(self.read_ticks, prev.read_ticks, read_iops),
            await_write_ms: await_ms(self.write_ticks, prev.write_ticks, write_iops),
            await_discard_ms: await_ms(self.discard_ticks, prev.discard_ticks, discard_iops),
            utils: self.busy_centis - prev.busy_centis,
        }
    }
}

/// Per-device I/O rates between consecutive `/proc/diskstats` readings.
///
/// Only whole block devices (those under `/sys/block`) that have seen I/O
/// are reported. A device's first reading reports zeros.
#[derive(Debug, Default)]
pub(crate) struct IoTracker {
    prev: HashMap<String, Counters>,
}

impl IoTracker {
    pub(crate) fn update(&mut self, diskstats: &str, paths: &HostPaths) -> BTreeMap<String, IoStat> {
        let mut rates = BTreeMap::new();
        let mut seen = HashMap::new();

        for (device, counters) in diskstats.lines().filter_map(Counters::parse) {
            if counters.total_ios() <= 0 || !paths.block_device(&device).exists() {
                continue;
            }

            let stat = match self.prev.get(&device) {
                Some(prev) => counters.delta(prev),
                None => IoStat::default(),
            };
            rates.insert(device.clone(), stat);
            seen.insert(device, counters);
        }

        self.prev = seen;
        rates
    }
}
