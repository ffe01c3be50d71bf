//! Tester role: the periodic probe-cycle scheduler
//!
//! A tester introduces itself to the monitor, fetches the remote probe
//! configuration, merges it under the local file (local sections win),
//! and then runs one probe cycle every five seconds. Within a cycle the
//! ICMP phase completes before the HTTP phase begins, the two result
//! maps are merged into one snapshot, and the snapshot is shipped as a
//! `STATS_UPDATE` record. A failed ship reconnects with the same backoff
//! policy as startup; that cycle's statistics are dropped, not retried.

use crate::codec::{Command, LineCodec};
use crate::http::{HttpProber, HttpTarget};
use futures::future::join_all;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use regex::Regex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval, sleep, timeout, timeout_at, Instant, MissedTickBehavior};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};
use wardmon_core::{Config, ParamValue, ProbeOutcome, Result, Section, StatsSnapshot};
use wardmon_net::{IcmpProbe, ProbeKind};

/// Pause between probe cycles
pub const CYCLE_INTERVAL: Duration = Duration::from_secs(5);
/// Wall-clock budget for the ICMP phase of a cycle
pub const ICMP_PHASE_BUDGET: Duration = Duration::from_secs(5);
/// Timeout for one connection attempt to the monitor
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Total timeout for reading the initial config reply
pub const CONFIG_READ_TIMEOUT: Duration = Duration::from_secs(20);

pub const DEFAULT_MONITOR_HOST: &str = "localhost";
pub const DEFAULT_MONITOR_PORT: u16 = 5000;

const BACKOFF_STEP: Duration = Duration::from_secs(5);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

type Link = Framed<TcpStream, LineCodec>;

/// Linear retry schedule: 5 s, 10 s, ... capped at 60 s
#[derive(Debug)]
struct Backoff {
    delay: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            delay: BACKOFF_STEP,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = (self.delay + BACKOFF_STEP).min(BACKOFF_CAP);
        delay
    }
}

/// One configured ICMP target and its engine
pub struct IcmpTarget {
    pub name: String,
    pub probe: IcmpProbe,
}

/// Run the tester role until the process is stopped
pub async fn run(file_config: Config) -> Result<()> {
    let name = self_name(&file_config);
    let (host, port) = monitor_endpoint(&file_config);
    info!("tester {} reporting to {}:{}", name, host, port);

    let mut link = connect(&host, port).await;
    let remote = fetch_remote_config(&mut link, &name).await;
    let config = file_config.overlay_on(remote);

    let (icmp, http) = build_probe_set(&config);
    info!("probe set: {} ICMP targets, {} HTTP targets", icmp.len(), http.len());

    let mut tester = Tester {
        name,
        host,
        port,
        link,
        icmp,
        http,
        prober: HttpProber::new()?,
    };
    tester.run_loop().await
}

struct Tester {
    name: String,
    host: String,
    port: u16,
    link: Link,
    icmp: Vec<IcmpTarget>,
    http: Vec<HttpTarget>,
    prober: HttpProber,
}

impl Tester {
    async fn run_loop(&mut self) -> Result<()> {
        let mut ticks = interval(CYCLE_INTERVAL);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            if self.icmp.is_empty() && self.http.is_empty() {
                debug!("no probes configured, idling");
                continue;
            }
            let snapshot = self.run_cycle().await;
            self.ship(snapshot).await;
        }
    }

    /// One full cycle: ICMP phase, then HTTP phase, merged
    async fn run_cycle(&mut self) -> StatsSnapshot {
        let mut snapshot = self.icmp_phase().await;
        snapshot.extend(self.prober.run_cycle(&self.http).await);
        snapshot
    }

    /// Drive every ICMP engine concurrently under one phase deadline
    ///
    /// All engines share a single task; each exchange is a future over
    /// its own engine. An engine still unanswered at the deadline is
    /// aborted and records the failure sentinel for this cycle only.
    async fn icmp_phase(&mut self) -> StatsSnapshot {
        let deadline = Instant::now() + ICMP_PHASE_BUDGET;
        let exchanges = self.icmp.iter_mut().map(|target| async move {
            let outcome = match timeout_at(deadline, target.probe.exchange()).await {
                Ok(Ok(())) => {
                    if target.probe.reply_good() {
                        ProbeOutcome::Rtt(target.probe.response().map(|r| r.time).unwrap_or(0.0))
                    } else {
                        debug!("probe {} drew an unexpected reply type", target.name);
                        ProbeOutcome::Unreachable
                    }
                }
                Ok(Err(e)) => {
                    debug!("probe {} failed: {}", target.name, e);
                    ProbeOutcome::Unreachable
                }
                Err(_) => {
                    target.probe.abort();
                    debug!("probe {} unanswered at the phase deadline", target.name);
                    ProbeOutcome::Unreachable
                }
            };
            (target.name.clone(), outcome)
        });
        join_all(exchanges).await.into_iter().collect()
    }

    async fn ship(&mut self, snapshot: StatsSnapshot) {
        let payload = match serde_json::to_string(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                error!("cannot serialize statistics: {}", e);
                return;
            }
        };
        debug!("shipping {}", payload);
        if let Err(e) = self.link.send(Command::StatsUpdate(payload).into_line()).await {
            warn!("stats update failed: {}, reconnecting", e);
            self.reconnect().await;
        }
    }

    /// Re-establish the monitor connection; the lost cycle is not retried
    async fn reconnect(&mut self) {
        let mut link = connect(&self.host, self.port).await;
        if let Err(e) = link.send(Command::Name(self.name.clone()).into_line()).await {
            warn!("cannot reintroduce tester to monitor: {}", e);
        }
        self.link = link;
    }
}

/// Connect to the monitor, retrying until it answers
async fn connect(host: &str, port: u16) -> Link {
    let mut backoff = Backoff::new();
    loop {
        match timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                info!("connected to monitor at {}:{}", host, port);
                return Framed::new(stream, LineCodec::new());
            }
            Ok(Err(e)) => warn!("connection to {}:{} failed: {}", host, port, e),
            Err(_) => warn!("connection to {}:{} timed out", host, port),
        }
        let delay = backoff.next_delay();
        info!("retrying in {}s", delay.as_secs());
        sleep(delay).await;
    }
}

/// Introduce this tester and fetch the remote probe configuration
///
/// Any failure along the way degrades to an empty remote config; the
/// tester then runs on its local file alone.
async fn fetch_remote_config(link: &mut Link, name: &str) -> Config {
    if let Err(e) = link.feed(Command::Name(name.to_string()).into_line()).await {
        warn!("cannot introduce tester to monitor: {}", e);
        return Config::default();
    }
    if let Err(e) = link.send(Command::ConfigRequest.into_line()).await {
        warn!("cannot request config from monitor: {}", e);
        return Config::default();
    }

    match timeout(CONFIG_READ_TIMEOUT, link.next()).await {
        Ok(Some(Ok(line))) => match serde_json::from_str(&line) {
            Ok(remote) => remote,
            Err(e) => {
                error!("cannot parse remote config: {}, raw: {:?}", e, line);
                Config::default()
            }
        },
        Ok(Some(Err(e))) => {
            warn!("reading remote config failed: {}", e);
            Config::default()
        }
        Ok(None) => {
            warn!("monitor closed the connection before sending config");
            Config::default()
        }
        Err(_) => {
            warn!("timed out waiting for remote config");
            Config::default()
        }
    }
}

/// Build engines and HTTP targets from every non-`general` section
///
/// A target missing its required fields is skipped with a diagnostic;
/// the rest of the probe set is unaffected.
pub fn build_probe_set(config: &Config) -> (Vec<IcmpTarget>, Vec<HttpTarget>) {
    let mut icmp = Vec::new();
    let mut http = Vec::new();

    for (name, section) in config.targets() {
        let Some(proto) = param(section, "proto") else {
            error!("target {}: missing proto, skipping", name);
            continue;
        };
        match proto {
            "icmp" => {
                let Some(dest) = param(section, "dest") else {
                    error!("target {}: missing dest, skipping", name);
                    continue;
                };
                let source = param(section, "source").unwrap_or("0.0.0.0");
                let kind = match param(section, "type") {
                    Some("timestamp") => ProbeKind::Timestamp,
                    Some("echo") | None => ProbeKind::echo(),
                    Some(other) => {
                        warn!("target {}: unknown icmp type {:?}, using echo", name, other);
                        ProbeKind::echo()
                    }
                };
                match IcmpProbe::new(dest, source, kind) {
                    Ok(probe) => icmp.push(IcmpTarget {
                        name: name.to_string(),
                        probe,
                    }),
                    Err(e) => error!("target {}: {}, skipping", name, e),
                }
            }
            "http" | "https" => {
                let Some(url) = param(section, "url") else {
                    error!("target {}: missing url, skipping", name);
                    continue;
                };
                let Some(pattern) = param(section, "regex") else {
                    error!("target {}: missing regex, skipping", name);
                    continue;
                };
                match Regex::new(pattern) {
                    Ok(pattern) => http.push(HttpTarget {
                        name: name.to_string(),
                        url: url.to_string(),
                        pattern,
                    }),
                    Err(e) => error!("target {}: bad regex: {}, skipping", name, e),
                }
            }
            other => warn!("target {}: unknown proto {:?}, skipping", name, other),
        }
    }

    (icmp, http)
}

fn param<'a>(section: &'a Section, key: &str) -> Option<&'a str> {
    section.get(key).and_then(ParamValue::as_str)
}

fn self_name(config: &Config) -> String {
    match config.general("name") {
        Some(name) => name.to_string(),
        None => {
            let name = random_name();
            warn!("name is not configured, using random name {}", name);
            name
        }
    }
}

/// Eight random ASCII letters, capitalised
fn random_name() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|i| {
            let letter = (b'a' + rng.gen_range(0..26)) as char;
            if i == 0 {
                letter.to_ascii_uppercase()
            } else {
                letter
            }
        })
        .collect()
}

/// Monitor endpoint from `general.monitor`, with defaults applied
fn monitor_endpoint(config: &Config) -> (String, u16) {
    let Some(value) = config.general("monitor") else {
        warn!(
            "monitor not configured, using {}:{}",
            DEFAULT_MONITOR_HOST, DEFAULT_MONITOR_PORT
        );
        return (DEFAULT_MONITOR_HOST.to_string(), DEFAULT_MONITOR_PORT);
    };
    match value.split_once(':') {
        Some((host, port)) => {
            let host = if host.is_empty() {
                warn!("empty monitor host, using {}", DEFAULT_MONITOR_HOST);
                DEFAULT_MONITOR_HOST.to_string()
            } else {
                host.to_string()
            };
            let port = port.parse().unwrap_or_else(|_| {
                warn!("invalid monitor port {:?}, using {}", port, DEFAULT_MONITOR_PORT);
                DEFAULT_MONITOR_PORT
            });
            (host, port)
        }
        None => (value.to_string(), DEFAULT_MONITOR_PORT),
    }
}
