use netip_types::MemStats;

/// Extract the tracked `/proc/meminfo` counters, in KiB
pub(crate) fn parse_meminfo(text: &str) -> MemStats {
    let mut stats = MemStats::default();
    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let slot = match key {
            "MemTotal" => &mut stats.mem_total,
            "MemFree" => &mut stats.mem_free,
            "Buffers" => &mut stats.buffers,
            "Cached" => &mut stats.cached,
            "Slab" => &mut stats.slab,
            "SwapTotal" => &mut stats.swap_total,
            "SwapFree" => &mut stats.swap_free,
            _ => continue,
        };
        *slot = value;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meminfo() {
        let stats = parse_meminfo(
            "MemTotal:       32768000 kB
MemFree:         1024000 kB
MemAvailable:    2048000 kB
Buffers:          512 kB
Cached:          4096 kB
SwapCached:         0 kB
Slab:             256 kB
SwapTotal:       8192 kB
SwapFree:        8000 kB
",
        );
        assert_eq!(
            stats,
            MemStats {
                mem_total: 32_768_000,
                mem_free: 1_024_000,
                buffers: 512,
                cached: 4096,
                slab: 256,
                swap_total: 8192,
                swap_free: 8000,
            }
        );
    }

    #[test]
    fn test_unparseable_value_is_zero() {
        let stats = parse_meminfo("MemTotal: lots\nMemFree: 10 kB\n");
        assert_eq!(stats.mem_total, 0);
        assert_eq!(stats.mem_free, 10);
    }
}
