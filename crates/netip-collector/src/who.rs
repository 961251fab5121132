//! Login session tracking (`who-logged`) from logind signals.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use netip_types::{SessionChange, WhoLogged};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::shell;

static SESSION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*string\s+"([^"]+)""#).expect("valid regex"));

const UNKNOWN_USER: &str = "unknown";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct WhoConfig {
    /// Signal monitor command line
    pub monitor: Vec<String>,
    /// Session lookup launcher; `show-session <id> -p ...` is appended
    pub loginctl: Vec<String>,
    pub restart_delay: Duration,
}

impl Default for WhoConfig {
    fn default() -> Self {
        Self {
            monitor: vec![
                "dbus-monitor".to_string(),
                "--system".to_string(),
                "type='signal',sender='org.freedesktop.login1'".to_string(),
            ],
            loginctl: vec!["loginctl".to_string()],
            restart_delay: Duration::from_secs(8),
        }
    }
}

/// Pairs a `member=SessionNew|SessionRemoved` header with the session id
/// on the first `string "..."` line that follows it.
#[derive(Debug, Default)]
struct SignalParser {
    pending: Option<SessionChange>,
}

impl SignalParser {
    fn feed(&mut self, line: &str) -> Option<(SessionChange, String)> {
        let lower = line.to_lowercase();
        if lower.contains("member=sessionnew") {
            self.pending = Some(SessionChange::New);
            return None;
        }
        if lower.contains("member=sessionremoved") {
            self.pending = Some(SessionChange::Removed);
            return None;
        }

        let change = self.pending?;
        let id = SESSION_ID.captures(line)?[1].to_string();
        self.pending = None;
        Some((change, id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LoginDetails {
    user: String,
    device: String,
    ip: String,
}

impl Default for LoginDetails {
    fn default() -> Self {
        Self {
            user: UNKNOWN_USER.to_string(),
            device: String::new(),
            ip: String::new(),
        }
    }
}

fn parse_loginctl(output: &str) -> LoginDetails {
    let mut details = LoginDetails::default();
    let mut address = String::new();

    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        match key {
            "Name" => details.user = value.to_string(),
            "TTY" => details.device = value.to_string(),
            "RemoteHost" if value != "n/a" => details.ip = value.to_string(),
            "RemoteAddress" if value != "n/a" => address = value.to_string(),
            _ => {}
        }
    }

    if details.ip.is_empty() {
        details.ip = address;
    }
    details
}

/// Remembers sessions with a known user so their removal can be reported
/// after logind has already forgotten them.
#[derive(Debug, Default)]
struct SessionTracker {
    sessions: HashMap<String, WhoLogged>,
}

impl SessionTracker {
    fn cached_removal(&mut self, id: &str) -> Option<WhoLogged> {
        self.sessions.remove(id).map(|mut event| {
            event.session = SessionChange::Removed;
            event.time = Utc::now();
            event
        })
    }

    fn record(&mut self, change: SessionChange, id: &str, details: LoginDetails) -> Option<WhoLogged> {
        let known = details.user != UNKNOWN_USER;
        let event = WhoLogged {
            session: change,
            time: Utc::now(),
            device: details.device,
            user: details.user,
            ip: details.ip,
        };

        match change {
            SessionChange::New => {
                if known {
                    self.sessions.insert(id.to_string(), event.clone());
                }
                Some(event)
            }
            SessionChange::Removed => known.then_some(event),
        }
    }
}

async fn lookup(config: &WhoConfig, change: SessionChange, id: &str) -> LoginDetails {
    let args = [
        "show-session",
        id,
        "-p",
        "Name",
        "-p",
        "TTY",
        "-p",
        "RemoteHost",
        "-p",
        "RemoteAddress",
    ];
    let Some((program, args)) = shell::with_prefix(&config.loginctl, &args) else {
        return LoginDetails::default();
    };

    match shell::run_with_timeout(&program, &args, LOOKUP_TIMEOUT).await {
        Ok(output) => parse_loginctl(&output),
        Err(e) => {
            if change == SessionChange::New {
                warn!("Session {} lookup failed: {}", id, e);
            }
            LoginDetails::default()
        }
    }
}

async fn handle(
    config: &WhoConfig,
    tracker: &mut SessionTracker,
    change: SessionChange,
    id: &str,
) -> Option<WhoLogged> {
    if change == SessionChange::Removed
        && let Some(event) = tracker.cached_removal(id)
    {
        return Some(event);
    }
    let details = lookup(config, change, id).await;
    tracker.record(change, id, details)
}

/// Run the monitor once, until it exits or `cancel` fires
async fn watch_once(
    config: &WhoConfig,
    tracker: &mut SessionTracker,
    tx: &mpsc::Sender<WhoLogged>,
    cancel: &CancellationToken,
) -> Result<()> {
    let (program, args) = config
        .monitor
        .split_first()
        .ok_or_else(|| Error::parse("empty session monitor command"))?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Command {
            command: program.clone(),
            detail: e.to_string(),
        })?;
    info!("Session monitor started");

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("Session monitor stderr: {}", line);
            }
        });
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::parse("session monitor stdout unavailable"))?;
    let mut lines = BufReader::new(stdout).lines();
    let mut parser = SignalParser::default();

    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let Some((change, id)) = parser.feed(&line) else {
            continue;
        };

        debug!("Session {} {}", id, change.as_str());
        if let Some(event) = handle(config, tracker, change, &id).await
            && tx.send(event).await.is_err()
        {
            return Ok(());
        }
    }

    let status = child.wait().await?;
    info!("Session monitor exited: {}", status);
    Ok(())
}

/// Forward login session changes, restarting the monitor whenever it exits
pub async fn run(config: WhoConfig, tx: mpsc::Sender<WhoLogged>, cancel: CancellationToken) {
    let mut tracker = SessionTracker::default();
    loop {
        if let Err(e) = watch_once(&config, &mut tracker, &tx, &cancel).await {
            warn!("Session monitor failed: {}", e);
        }
        if tx.is_closed() {
            break;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.restart_delay) => {}
        }
    }
    debug!("Session monitor stopped");
}
