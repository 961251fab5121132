use std::collections::BTreeMap;
use std::sync::LazyLock;

use netip_types::{RaidMd, RaidMdAdm, RaidProc};
use regex::Regex;
use tracing::warn;

static ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(md\S*) :(.*?)\n\n").expect("valid regex"));
static MEMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S*)\[\d*]").expect("valid regex"));
static SYNC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(check|resync|recovery) = .*?(.+)%.*?finish=(.*)min speed=(.*)K/sec")
        .expect("valid regex")
});
static DETAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s)Creation Time : (.*?)\n",
        r".*?Raid Level : (.*?)\n",
        r".*?Array Size : .*?\(.*?B (.*?)\)\n",
        r".*?State :(.*?)\n",
        r".*?Active Devices : (.*?)\n",
        r".*?Working Devices : (.*?)\n",
        r".*?Failed Devices : (.*?)\n",
        r".*?Spare Devices : (.*?)\n",
        r".*?Name : (\S*)",
    ))
    .expect("valid regex")
});

fn sync_state(body: &str) -> RaidProc {
    let mut state = RaidProc::default();
    let Some(c) = SYNC.captures(body) else {
        return state;
    };

    state.state = c[1].to_string();
    match c[2].trim().parse() {
        Ok(progress) => state.progress = progress,
        Err(e) => state.parse_err = format!("progress: {e}"),
    }
    match c[3].trim().parse::<f64>() {
        Ok(minutes) => state.left = minutes * 60.0,
        Err(e) => state.parse_err = format!("left: {e}"),
    }
    match c[4].trim().parse() {
        Ok(speed) => state.speed = speed,
        Err(e) => state.parse_err = format!("speed: {e}"),
    }
    state
}

/// Arrays listed in `/proc/mdstat` with their members and any running sync
pub(crate) fn parse_mdstat(text: &str) -> BTreeMap<String, RaidMd> {
    ARRAY
        .captures_iter(text)
        .map(|c| {
            let body = &c[2];
            let disks = MEMBER
                .captures_iter(body)
                .map(|m| m[1].to_string())
                .collect();
            let array = RaidMd {
                disks,
                proc: sync_state(body),
                proc_out: body.to_string(),
                ..RaidMd::default()
            };
            (c[1].to_string(), array)
        })
        .collect()
}

/// Summary fields from `mdadm -D` output
pub(crate) fn parse_mdadm(text: &str) -> RaidMdAdm {
    let Some(c) = DETAIL.captures(text) else {
        warn!("Unrecognised mdadm detail output");
        return RaidMdAdm::default();
    };
    let field = |i: usize| c[i].trim().to_string();

    RaidMdAdm {
        name: field(9),
        state: c[4].trim().to_lowercase(),
        level: c[2].trim().to_uppercase(),
        capacity: field(3),
        created_at: field(1),
        active: field(5),
        working: field(6),
        failed: field(7),
        spare: field(8),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;

    const MDSTAT: &str = "Personalities : [raid1] [raid10]
md1 : active raid1 sdd1[1] sdc1[0]
      976630464 blocks super 1.2 [2/2] [UU]
      [=>...................]  resync =  8.5% (83456000/976630464) finish=120.3min speed=135000K/sec
      bitmap: 8/8 pages [32KB], 65536KB chunk

md0 : active raid1 sdb1[1] sda1[0]
      488253440 blocks super 1.2 [2/2] [UU]
      bitmap: 0/4 pages [0KB], 65536KB chunk

unused devices: <none>
";

    const MDADM: &str = "/dev/md1:
           Version : 1.2
     Creation Time : Mon Jan  1 10:00:00 2024
        Raid Level : raid1
        Array Size : 976630464 (931.39 GiB 1000.07 GB)
     Used Dev Size : 976630464 (931.39 GiB 1000.07 GB)
      Raid Devices : 2
     Total Devices : 2
       Persistence : Superblock is persistent

       Update Time : Mon Jan  1 12:00:00 2024
             State : Clean, Resyncing
    Active Devices : 2
   Working Devices : 2
    Failed Devices : 0
     Spare Devices : 0

Consistency Policy : bitmap

              Name : node1:1  (local to host node1)
              UUID : 3f1c2b1a:00000000:00000000:00000000
";

    #[test]
    fn test_parse_mdstat() {
        let arrays = parse_mdstat(MDSTAT);
        assert_eq!(arrays.keys().collect::<Vec<_>>(), vec!["md0", "md1"]);

        let md1 = &arrays["md1"];
        assert_eq!(md1.disks, vec!["sdd1", "sdc1"]);
        assert_eq!(md1.proc.state, "resync");
        assert_eq!(md1.proc.progress, 8.5);
        assert!((md1.proc.left - 7218.0).abs() < 1e-6);
        assert_eq!(md1.proc.speed, 135_000);
        assert!(md1.proc.parse_err.is_empty());
        assert!(md1.proc_out.contains("resync"));

        let md0 = &arrays["md0"];
        assert_eq!(md0.disks, vec!["sdb1", "sda1"]);
        assert_eq!(md0.proc, RaidProc::default());
    }

    #[test]
    fn test_parse_mdstat_without_arrays() {
        assert!(parse_mdstat("Personalities : \nunused devices: <none>\n").is_empty());
    }

    #[test]
    fn test_parse_mdadm() {
        let adm = parse_mdadm(MDADM);
        assert_eq!(
            adm,
            RaidMdAdm {
                name: "node1:1".to_string(),
                state: "clean, resyncing".to_string(),
                level: "RAID1".to_string(),
                capacity: "1000.07 GB".to_string(),
                created_at: "Mon Jan  1 10:00:00 2024".to_string(),
                active: "2".to_string(),
                working: "2".to_string(),
                failed: "0".to_string(),
                spare: "0".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_mdadm_unrecognised() {
        assert_eq!(parse_mdadm("mdadm: cannot open /dev/md9"), RaidMdAdm::default());
    }
}
