use netip_types::CpuStats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Jiffies {
    idle: i64,
    total: i64,
}

impl Jiffies {
    /// Parse a `cpuN user nice system idle ...` line
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let label = fields.next()?;
        if label == "cpu" || !label.starts_with("cpu") {
            return None;
        }
        let values: Vec<i64> = fields.filter_map(|f| f.parse().ok()).collect();
        Some(Self {
            idle: *values.get(3)?,
            total: values.iter().sum(),
        })
    }
}

/// Per-core utilisation from consecutive `/proc/stat` readings
#[derive(Debug, Default)]
pub(crate) struct CpuTracker {
    prev: Vec<Jiffies>,
}

impl CpuTracker {
    pub(crate) fn update(&mut self, stat: &str) -> CpuStats {
        let current: Vec<Jiffies> = stat.lines().filter_map(Jiffies::parse).collect();

        let cores: Vec<u32> = current
            .iter()
            .enumerate()
            .map(|(i, now)| {
                let before = self.prev.get(i).copied().unwrap_or_default();
                let (mut idle, mut total) = (now.idle - before.idle, now.total - before.total);
                if total <= 0 {
                    idle = now.idle;
                    total = now.total;
                }
                if total <= 0 {
                    return 0;
                }
                let busy = (1000 * (total - idle) / total + 5) / 10;
                u32::try_from(busy.clamp(0, 100)).unwrap_or(0)
            })
            .collect();

        self.prev = current;

        #[allow(clippy::cast_precision_loss)]
        let avg = if cores.is_empty() {
            0.0
        } else {
            cores.iter().sum::<u32>() as f32 / cores.len() as f32
        };

        CpuStats { cores, avg }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;

    const FIRST: &str = "cpu  200 0 100 700 0 0 0 0 0 0
cpu0 100 0 50 350 0 0 0 0 0 0
cpu1 100 0 50 350 0 0 0 0 0 0
intr 12345
";

    const SECOND: &str = "cpu  400 0 100 1100 0 0 0 0 0 0
cpu0 200 0 50 450 0 0 0 0 0 0
cpu1 100 0 50 650 0 0 0 0 0 0
";

    #[test]
    fn test_first_reading_uses_totals() {
        let mut tracker = CpuTracker::default();
        let stats = tracker.update(FIRST);
        assert_eq!(stats.cores, vec![30, 30]);
        assert_eq!(stats.avg, 30.0);
    }

    #[test]
    fn test_second_reading_uses_deltas() {
        let mut tracker = CpuTracker::default();
        tracker.update(FIRST);
        let stats = tracker.update(SECOND);
        // cpu0: 100 busy of 200; cpu1: 0 busy of 300
        assert_eq!(stats.cores, vec![50, 0]);
        assert_eq!(stats.avg, 25.0);
    }

    #[test]
    fn test_unchanged_counters_fall_back_to_totals() {
        let mut tracker = CpuTracker::default();
        tracker.update(FIRST);
        let stats = tracker.update(FIRST);
        assert_eq!(stats.cores, vec![30, 30]);
    }

    #[test]
    fn test_no_cores() {
        let mut tracker = CpuTracker::default();
        let stats = tracker.update("intr 1\n");
        assert!(stats.cores.is_empty());
        assert_eq!(stats.avg, 0.0);
    }
}
