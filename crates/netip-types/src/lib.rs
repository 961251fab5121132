//! Shared wire types for netip components.
//!
//! This crate provides the types that cross the uplink: the outbound event
//! envelope, inbound control-plane commands, and the payloads every producer
//! emits. All types are serializable with the exact field names the control
//! plane expects.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event name of the periodic core metrics sample
pub const EVENT_COLLECT_CORE: &str = "collect-core";
/// Event name of a login session change
pub const EVENT_WHO_LOGGED: &str = "who-logged";
/// Event name of the process census
pub const EVENT_PROCESSES: &str = "processes";
/// Event name of a finished benchmark run
pub const EVENT_BMS_GENERAL_TESTS: &str = "bms-general-tests";
/// Event name of the disks health sweep
pub const EVENT_DISKS_INFO: &str = "disks-info";

/// Command that starts a benchmark run
pub const COMMAND_GENERAL_TESTS: &str = "general-tests";
/// Command that asks the agent to shut down
pub const COMMAND_SERVICES_DESTROY: &str = "services-destroy";

fn is_empty_str(s: &str) -> bool {
    s.is_empty()
}

// ============================================================================
// Envelope
// ============================================================================

/// A telemetry event as it travels over the wire: `{event, ...payload}`.
///
/// The body never carries an `event` key of its own; constructors strip it so
/// the flattened frame has a single discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub event: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl OutboundEvent {
    #[must_use]
    pub fn new(event: impl Into<String>, mut body: Map<String, Value>) -> Self {
        body.remove("event");
        Self {
            event: event.into(),
            body,
        }
    }

    /// Build an event with a single payload field, e.g. `{event, collectCore: {...}}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn with_field<T: Serialize>(
        event: impl Into<String>,
        field: &str,
        payload: &T,
    ) -> serde_json::Result<Self> {
        let mut body = Map::new();
        body.insert(field.to_string(), serde_json::to_value(payload)?);
        Ok(Self::new(event, body))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.event
    }

    /// Serialize to the JSON text sent as one websocket frame.
    ///
    /// # Errors
    ///
    /// Returns an error if a body value cannot be serialized.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Typed events emitted by the agent's producers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TelemetryEvent {
    /// Periodic CPU, memory, I/O and temperature sample
    CollectCore {
        #[serde(rename = "collectCore")]
        collect_core: CollectCore,
    },

    /// A login session appeared or disappeared
    WhoLogged {
        #[serde(rename = "whoLogged")]
        who_logged: WhoLogged,
    },

    /// Process census
    Processes { processes: Vec<Proc> },

    /// Finished benchmark run
    BmsGeneralTests {
        #[serde(rename = "bmsTests")]
        bms_tests: Box<BenchResult>,
    },

    /// SMART, md RAID and ZFS sweep
    DisksInfo {
        #[serde(rename = "disksInfo")]
        disks_info: Box<DisksInfo>,
    },
}

impl TelemetryEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::CollectCore { .. } => EVENT_COLLECT_CORE,
            TelemetryEvent::WhoLogged { .. } => EVENT_WHO_LOGGED,
            TelemetryEvent::Processes { .. } => EVENT_PROCESSES,
            TelemetryEvent::BmsGeneralTests { .. } => EVENT_BMS_GENERAL_TESTS,
            TelemetryEvent::DisksInfo { .. } => EVENT_DISKS_INFO,
        }
    }
}

impl TryFrom<TelemetryEvent> for OutboundEvent {
    type Error = serde_json::Error;

    fn try_from(event: TelemetryEvent) -> Result<Self, Self::Error> {
        use serde::ser::Error;

        let Value::Object(mut body) = serde_json::to_value(&event)? else {
            return Err(serde_json::Error::custom(
                "telemetry event did not serialize to a JSON object",
            ));
        };

        let Some(Value::String(name)) = body.remove("event") else {
            return Err(serde_json::Error::custom(
                "telemetry event missing 'event' field after serialization",
            ));
        };

        Ok(Self { event: name, body })
    }
}

// ============================================================================
// Inbound commands
// ============================================================================

/// Raw command frame sent by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundCommand {
    pub command: String,
    #[serde(default)]
    pub runtime: i64,
}

/// Decoded inbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the benchmark suite, `runtime` seconds per test
    GeneralTests { runtime: u32 },
    /// Stop the agent
    ServicesDestroy,
    /// Anything the agent does not recognize
    Unknown(String),
}

impl From<InboundCommand> for Command {
    fn from(cmd: InboundCommand) -> Self {
        match cmd.command.as_str() {
            COMMAND_GENERAL_TESTS => Command::GeneralTests {
                runtime: u32::try_from(cmd.runtime).unwrap_or(0),
            },
            COMMAND_SERVICES_DESTROY => Command::ServicesDestroy,
            _ => Command::Unknown(cmd.command),
        }
    }
}

// ============================================================================
// Host snapshot
// ============================================================================

/// Static host description sent with the handshake
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Boot time as a unix timestamp
    pub uptime: i64,
    pub data: HostData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostData {
    pub cpu: CpuInfo,
    pub board: BoardInfo,
    pub kernel: KernelInfo,
    pub mem: MemInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub vendor: String,
    pub model: String,
    /// Clock rate in MHz
    pub speed: u32,
    /// Cache size in KB
    pub cache: u32,
    /// Physical CPUs
    pub cpus: u32,
    /// Physical cores
    pub cores: u32,
    /// Logical cores
    pub threads: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardInfo {
    pub name: String,
    pub vendor: String,
    pub bios_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelInfo {
    pub architecture: String,
    pub os_type: String,
    pub os_release: String,
    pub os_version: String,
}

/// Installed memory in GiB
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemInfo {
    pub ram: f64,
    pub swap: f64,
}

// ============================================================================
// collect-core
// ============================================================================

/// One metrics sample. `Time` and `LoadAvg` keep their historical capitalized keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectCore {
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "LoadAvg")]
    pub load_avg: Vec<String>,
    pub cpu_stats: CpuStats,
    pub mem_stats: MemStats,
    pub io_stats: BTreeMap<String, IoStat>,
    #[serde(default)]
    pub temp_stats: Vec<TempStat>,
}

/// Per-core busy percent and their average
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    pub cores: Vec<u32>,
    pub avg: f32,
}

/// Values from `/proc/meminfo`, in KB
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemStats {
    pub mem_total: u64,
    pub mem_free: u64,
    pub buffers: u64,
    pub cached: u64,
    pub slab: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

/// Per-second block device activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoStat {
    #[serde(rename = "readIOPS")]
    pub read_iops: i64,
    #[serde(rename = "writeIOPS")]
    pub write_iops: i64,
    #[serde(rename = "discardIOPS")]
    pub discard_iops: i64,
    pub read_kbs: i64,
    pub write_kbs: i64,
    pub discard_kbs: i64,
    pub await_read_ms: i64,
    pub await_write_ms: i64,
    pub await_discard_ms: i64,
    pub utils: i64,
}

/// Sensor reading in degrees Celsius
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TempStat {
    #[serde(default, skip_serializing_if = "is_empty_str")]
    pub label: String,
    pub temp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crit: Option<f64>,
}

// ============================================================================
// who-logged
// ============================================================================

/// Direction of a login session change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionChange {
    New,
    Removed,
}

impl SessionChange {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionChange::New => "new",
            SessionChange::Removed => "removed",
        }
    }
}

/// A login session change reported by logind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoLogged {
    pub session: SessionChange,
    pub time: DateTime<Utc>,
    pub device: String,
    pub user: String,
    pub ip: String,
}

// ============================================================================
// processes
// ============================================================================

/// One `/proc/<pid>` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proc {
    pub pid: i32,
    pub ppid: i32,
    pub name: String,
    pub state: String,
    pub threads: i64,
    pub fds: usize,
}

// ============================================================================
// disks-info
// ============================================================================

/// Wire version of the disks-info payload
pub const DISKS_INFO_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisksInfo {
    pub version: u32,
    pub time: DateTime<Utc>,
    pub smarts: BTreeMap<String, SmartDisk>,
    pub raids: BTreeMap<String, RaidMd>,
    pub zfs: Vec<RaidZfs>,
}

impl DisksInfo {
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            version: DISKS_INFO_VERSION,
            time,
            smarts: BTreeMap::new(),
            raids: BTreeMap::new(),
            zfs: Vec::new(),
        }
    }
}

/// Summary of `smartctl --all` for one device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartDisk {
    pub model: String,
    pub serial: String,
    pub capacity: String,
    pub health: String,
    pub used: String,
    /// Power-on time in seconds
    pub working: i64,
    pub temperature: String,
    pub full: String,
    #[serde(default, skip_serializing_if = "is_empty_str")]
    pub error: String,
}

/// md array from `/proc/mdstat`, enriched with `mdadm -D`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidMd {
    pub disks: Vec<String>,
    pub proc: RaidProc,
    pub proc_out: String,
    pub adm: RaidMdAdm,
    pub adm_out: String,
}

/// Running check/resync/recovery of an md array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidProc {
    pub state: String,
    pub progress: f64,
    /// Remaining time in seconds
    pub left: f64,
    /// Speed in KB/s
    pub speed: u64,
    #[serde(default, skip_serializing_if = "is_empty_str")]
    pub parse_err: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidMdAdm {
    pub name: String,
    pub state: String,
    pub level: String,
    pub capacity: String,
    pub created_at: String,
    pub active: String,
    pub working: String,
    pub failed: String,
    pub spare: String,
}

/// One top-level vdev of a ZFS pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidZfs {
    pub pool_name: String,
    pub pool_state: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: String,
    pub capacity: u64,
    pub devs: Vec<RaidZfsDev>,
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidZfsDev {
    pub name: String,
    pub state: String,
}

// ============================================================================
// bms-general-tests
// ============================================================================

/// Tool that produced a benchmark figure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSoftware {
    pub test: String,
    pub software: String,
    pub version: String,
}

/// Result of one `general-tests` run. A section stays empty when its test failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchResult {
    pub test: String,
    pub scheduled: bool,
    pub runtime: u32,
    pub cpu: CpuBench,
    pub mem: MemBench,
    pub io: IoBench,
    pub net: NetBench,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuBench {
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub software: Option<TestSoftware>,
    pub events_sec: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemBench {
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub software: Option<TestSoftware>,
    #[serde(rename = "speedMib")]
    pub speed_mib: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IoBench {
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub software: Option<TestSoftware>,
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub fio: Option<FioResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetBench {
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub software: Option<TestSoftware>,
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub speedtest: Option<SpeedTest>,
}

/// Figures extracted from fio's JSON report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FioResult {
    /// Read bandwidth in bytes per second
    #[serde(rename = "read")]
    pub read_bw: u64,
    pub read_iops: f64,
    pub read_lat_ns: f64,
    /// Write bandwidth in bytes per second
    #[serde(rename = "write")]
    pub write_bw: u64,
    pub write_iops: f64,
    pub write_lat_ns: f64,
}

/// `speedtest-cli --json` report, field names as the tool prints them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTest {
    pub download: f64,
    pub upload: f64,
    pub ping: f64,
    pub server: SpeedTestServer,
    pub timestamp: String,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub client: SpeedTestClient,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTestServer {
    pub url: String,
    pub lat: String,
    pub lon: String,
    pub name: String,
    pub country: String,
    pub cc: String,
    pub sponsor: String,
    pub id: String,
    pub host: String,
    pub d: f64,
    pub latency: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTestClient {
    pub ip: String,
    pub lat: String,
    pub lon: String,
    pub isp: String,
    pub country: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_event_flattens_body() {
        let event = OutboundEvent::with_field("collect-core", "collectCore", &json!({"a": 1}))
            .unwrap();
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"event": "collect-core", "collectCore": {"a": 1}}));
    }

    #[test]
    fn test_outbound_event_new_strips_event_key() {
        let mut body = Map::new();
        body.insert("event".to_string(), json!("spoofed"));
        body.insert("x".to_string(), json!(true));
        let event = OutboundEvent::new("processes", body);
        assert_eq!(event.name(), "processes");
        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"event": "processes", "x": true}));
    }

    #[test]
    fn test_telemetry_event_names_match_wire() {
        let who = WhoLogged {
            session: SessionChange::New,
            time: DateTime::<Utc>::default(),
            device: "pts/0".to_string(),
            user: "root".to_string(),
            ip: "10.1.1.1".to_string(),
        };
        let event = TelemetryEvent::WhoLogged { who_logged: who };
        assert_eq!(event.name(), EVENT_WHO_LOGGED);

        let out = OutboundEvent::try_from(event).unwrap();
        assert_eq!(out.event, "who-logged");
        assert_eq!(out.body["whoLogged"]["session"], json!("new"));
        assert_eq!(out.body["whoLogged"]["user"], json!("root"));
    }

    #[test]
    fn test_bench_event_uses_bms_tests_key() {
        let event = TelemetryEvent::BmsGeneralTests {
            bms_tests: Box::new(BenchResult {
                test: "general-tests".to_string(),
                runtime: 10,
                ..Default::default()
            }),
        };
        let out = OutboundEvent::try_from(event).unwrap();
        assert_eq!(out.event, EVENT_BMS_GENERAL_TESTS);
        assert_eq!(out.body["bmsTests"]["runtime"], json!(10));
    }

    #[test]
    fn test_bench_sections_flatten_software() {
        let cpu = CpuBench {
            software: Some(TestSoftware {
                test: "cpu-prime".to_string(),
                software: "sysbench".to_string(),
                version: "1.0.20".to_string(),
            }),
            events_sec: 1234.5,
        };
        let value = serde_json::to_value(&cpu).unwrap();
        assert_eq!(value["software"], json!("sysbench"));
        assert_eq!(value["eventsSec"], json!(1234.5));

        let empty = serde_json::to_value(CpuBench::default()).unwrap();
        assert!(empty.get("software").is_none());
    }

    #[test]
    fn test_collect_core_keeps_capitalized_keys() {
        let core = CollectCore {
            load_avg: vec!["0.10".to_string(), "0.20".to_string(), "0.30".to_string()],
            ..Default::default()
        };
        let value = serde_json::to_value(&core).unwrap();
        assert!(value.get("Time").is_some());
        assert_eq!(value["LoadAvg"][2], json!("0.30"));
        assert!(value.get("cpuStats").is_some());
        assert!(value.get("memStats").is_some());
    }

    #[test]
    fn test_io_stat_field_names() {
        let value = serde_json::to_value(IoStat {
            read_iops: 3,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(value["readIOPS"], json!(3));
        assert!(value.get("awaitDiscardMs").is_some());
    }

    #[test]
    fn test_command_general_tests() {
        let raw: InboundCommand =
            serde_json::from_str(r#"{"command":"general-tests","runtime":15}"#).unwrap();
        assert_eq!(Command::from(raw), Command::GeneralTests { runtime: 15 });
    }

    #[test]
    fn test_command_negative_runtime_clamps_to_zero() {
        let raw = InboundCommand {
            command: COMMAND_GENERAL_TESTS.to_string(),
            runtime: -4,
        };
        assert_eq!(Command::from(raw), Command::GeneralTests { runtime: 0 });
    }

    #[test]
    fn test_command_destroy_without_runtime() {
        let raw: InboundCommand = serde_json::from_str(r#"{"command":"services-destroy"}"#).unwrap();
        assert_eq!(raw.runtime, 0);
        assert_eq!(Command::from(raw), Command::ServicesDestroy);
    }

    #[test]
    fn test_command_unknown() {
        let raw = InboundCommand {
            command: "reboot".to_string(),
            runtime: 0,
        };
        assert_eq!(Command::from(raw), Command::Unknown("reboot".to_string()));
    }

    #[test]
    fn test_disks_info_new_sets_version() {
        let info = DisksInfo::new(Utc::now());
        assert_eq!(info.version, DISKS_INFO_VERSION);
        assert!(info.smarts.is_empty());
    }
}

/// Property-based tests for the event envelope.
///
/// Every typed event must flatten into a frame whose only discriminator is the
/// `event` key and whose payload sits under exactly one field.
#[cfg(test)]
mod proptest_envelope_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_name() -> impl Strategy<Value = String> {
        proptest::string::string_regex("[a-z0-9_\\-.]{0,30}")
            .unwrap()
            .boxed()
    }

    prop_compose! {
        fn arb_proc()(
            pid in 1i32..1_000_000,
            ppid in 0i32..1_000_000,
            name in arb_name(),
            state in "[RSDZTI]",
            threads in 0i64..10_000,
            fds in 0usize..100_000
        ) -> Proc {
            Proc { pid, ppid, name, state, threads, fds }
        }
    }

    proptest! {
        #[test]
        fn processes_frame_has_single_discriminator(
            procs in proptest::collection::vec(arb_proc(), 0..50)
        ) {
            let count = procs.len();
            let out = OutboundEvent::try_from(TelemetryEvent::Processes { processes: procs }).unwrap();
            prop_assert_eq!(out.name(), EVENT_PROCESSES);

            let frame: Value = serde_json::from_str(&out.to_json().unwrap()).unwrap();
            let obj = frame.as_object().unwrap();
            prop_assert_eq!(obj.len(), 2);
            prop_assert_eq!(obj["event"].as_str(), Some(EVENT_PROCESSES));
            prop_assert_eq!(obj["processes"].as_array().map(Vec::len), Some(count));
        }

        #[test]
        fn command_runtime_never_wraps(runtime in any::<i64>()) {
            let cmd = Command::from(InboundCommand {
                command: COMMAND_GENERAL_TESTS.to_string(),
                runtime,
            });
            let Command::GeneralTests { runtime: parsed } = cmd else {
                panic!("expected general-tests");
            };
            if (0..=i64::from(u32::MAX)).contains(&runtime) {
                prop_assert_eq!(i64::from(parsed), runtime);
            } else {
                prop_assert_eq!(parsed, 0);
            }
        }
    }
}
