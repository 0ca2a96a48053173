//! Host health: memory, disk and per-process footprint.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::{json, Value};
use sysinfo::{Disks, Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

use inference_common::protocol::{DISK_ALERT_THR, LIB_VERSION, MEM_ALERT_THR};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

const SIZE_INFO: &str =
    "Memory Size is in GB. Total and avail mem may be reported inconsistently in containers.";

pub fn to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One host sample, sizes in GB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostSnapshot {
    pub mem_total: f64,
    pub mem_avail: f64,
    /// RSS of this process.
    pub mem_self: f64,
    /// RSS per child name.
    pub mem_children: BTreeMap<String, f64>,
    pub disk_total: f64,
    pub disk_avail: f64,
}

impl HostSnapshot {
    /// Memory held by this process and its children.
    pub fn mem_used(&self) -> f64 {
        self.mem_self + self.mem_children.values().sum::<f64>()
    }

    /// Host used memory not accounted to this process or its children.
    pub fn mem_sys(&self) -> f64 {
        (self.mem_total - self.mem_avail) - self.mem_used()
    }
}

/// Samples the host through `sysinfo`.
pub struct HostProbe {
    system: Mutex<System>,
    pid: Pid,
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
        );
        Self {
            system: Mutex::new(system),
            pid: Pid::from_u32(std::process::id()),
        }
    }

    /// Blocking; call from `spawn_blocking` inside the runtime.
    pub fn sample(&self, children: &[(String, u32)]) -> HostSnapshot {
        let mut system = match self.system.lock() {
            Ok(system) => system,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut pids = vec![self.pid];
        pids.extend(children.iter().map(|(_, pid)| Pid::from_u32(*pid)));

        system.refresh_memory();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            ProcessRefreshKind::everything(),
        );

        let rss = |pid: Pid| system.process(pid).map(|p| to_gb(p.memory())).unwrap_or(0.0);
        let mem_children = children
            .iter()
            .map(|(name, pid)| (name.clone(), rss(Pid::from_u32(*pid))))
            .collect();

        let (disk_total, disk_avail) = root_disk();

        HostSnapshot {
            mem_total: to_gb(system.total_memory()),
            mem_avail: to_gb(system.available_memory()),
            mem_self: rss(self.pid),
            mem_children,
            disk_total,
            disk_avail,
        }
    }
}

/// Total and available GB of the disk mounted at `/`, or the first disk.
pub fn root_disk() -> (f64, f64) {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .or_else(|| disks.list().first());

    match disk {
        Some(disk) => (to_gb(disk.total_space()), to_gb(disk.available_space())),
        None => (0.0, 0.0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alerts {
    pub mem_alert: bool,
    pub disk_alert: bool,
    pub alerts: Vec<String>,
}

/// Low-memory / low-disk alerts. Unknown totals never alert.
pub fn evaluate(snapshot: &HostSnapshot) -> Alerts {
    let below = |avail: f64, total: f64, thr: f64| total > 0.0 && avail / total < thr;

    let mem_alert = below(snapshot.mem_avail, snapshot.mem_total, MEM_ALERT_THR);
    let disk_alert = below(snapshot.disk_avail, snapshot.disk_total, DISK_ALERT_THR);

    let mut alerts = Vec::new();
    if mem_alert {
        alerts.push(format!("Memory below {} threshold.", MEM_ALERT_THR));
    }
    if disk_alert {
        alerts.push(format!("Disk below {} threshold.", DISK_ALERT_THR));
    }

    Alerts {
        mem_alert,
        disk_alert,
        alerts,
    }
}

/// Body of `SYSTEM_STATUS`.
pub fn system_status(
    snapshot: &HostSnapshot,
    server_name: &str,
    support_reports: &BTreeMap<String, Value>,
) -> Value {
    let servers: BTreeMap<&str, f64> = snapshot
        .mem_children
        .iter()
        .map(|(name, gb)| (name.as_str(), round2(*gb)))
        .collect();

    json!({
        "server_name": server_name,
        "gateway_version": LIB_VERSION,
        "mem_total": round2(snapshot.mem_total),
        "mem_avail": round2(snapshot.mem_avail),
        "mem_gateway": round2(snapshot.mem_self),
        "mem_used": round2(snapshot.mem_used()),
        "mem_sys": round2(snapshot.mem_sys()),
        "mem_servers": servers,
        "disk_avail": round2(snapshot.disk_avail),
        "disk_total": round2(snapshot.disk_total),
        "system": System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string()),
        "info": SIZE_INFO,
        "system_support_services": support_reports,
    })
}
