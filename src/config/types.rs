//! Configuration types

use crate::dataplane::{
    ArpLookupPolicy, ArpWindowPolicy, HierarchyRole, PortDirection, SwitchMode, SwitchSettings,
    DEFAULT_ARP_BLOCK, DEFAULT_ARP_EXPIRE, DEFAULT_ARP_SWEEP, DEFAULT_ELEPHANT_PORTS,
    DEFAULT_HELLO_PERIOD, DEFAULT_TCP_EXPIRE,
};
use crate::protocol::MacAddr;
use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// User-defined configuration (switch.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub switch: SwitchConfig,
    /// Ports by interface name. Port ids follow name order.
    #[serde(default)]
    pub ports: BTreeMap<String, PortConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

/// `[switch]` section
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    pub hierarchy: String,
    pub is_tor: Option<bool>,
    pub hello_period_ms: Option<u64>,
    pub arp_block_ms: Option<u64>,
    pub arp_expire_ms: Option<u64>,
    pub arp_sweep_ms: Option<u64>,
    pub tcp_expire_ms: Option<u64>,
    #[serde(default = "default_arp_policy")]
    pub arp_policy: String,
    #[serde(default = "default_arp_window")]
    pub arp_window: String,
    /// Inclusive [low, high] TCP port range of elephant flows
    pub elephant_ports: Option<(u16, u16)>,
    pub rng_seed: Option<u64>,
    /// Switch address; defaults to the first port's address
    pub mac: Option<String>,
}

/// `[ports.<name>]` section
#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    pub direction: String,
    /// Hardware address override for the port
    pub mac: Option<String>,
}

fn default_mode() -> String {
    SwitchMode::default().to_string()
}

fn default_arp_policy() -> String {
    "mobility".to_string()
}

fn default_arp_window() -> String {
    "by-kind".to_string()
}

fn millis_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}

impl SwitchConfig {
    pub fn hello_period(&self) -> Duration {
        millis_or(self.hello_period_ms, DEFAULT_HELLO_PERIOD)
    }

    pub fn arp_block(&self) -> Duration {
        millis_or(self.arp_block_ms, DEFAULT_ARP_BLOCK)
    }

    pub fn arp_expire(&self) -> Duration {
        millis_or(self.arp_expire_ms, DEFAULT_ARP_EXPIRE)
    }

    pub fn arp_sweep(&self) -> Duration {
        millis_or(self.arp_sweep_ms, DEFAULT_ARP_SWEEP)
    }

    pub fn tcp_expire(&self) -> Duration {
        millis_or(self.tcp_expire_ms, DEFAULT_TCP_EXPIRE)
    }

    pub fn elephant_range(&self) -> (u16, u16) {
        self.elephant_ports
            .unwrap_or((*DEFAULT_ELEPHANT_PORTS.start(), *DEFAULT_ELEPHANT_PORTS.end()))
    }

    pub fn hierarchy_role(&self) -> Result<HierarchyRole> {
        self.hierarchy.parse()
    }

    pub fn mac_addr(&self) -> Result<Option<MacAddr>> {
        parse_mac(self.mac.as_deref())
    }

    /// Resolve into engine settings
    pub fn settings(&self) -> Result<SwitchSettings> {
        let hierarchy = self.hierarchy_role()?;
        let (low, high) = self.elephant_range();

        Ok(SwitchSettings {
            mode: self.mode.parse()?,
            hierarchy,
            is_tor: self.is_tor.unwrap_or(hierarchy == HierarchyRole::Tor),
            hello_period: self.hello_period(),
            arp_block: self.arp_block(),
            arp_expire: self.arp_expire(),
            arp_sweep: self.arp_sweep(),
            tcp_expire: self.tcp_expire(),
            arp_policy: self.arp_policy.parse::<ArpLookupPolicy>()?,
            arp_window: self.arp_window.parse::<ArpWindowPolicy>()?,
            elephant_ports: low..=high,
            rng_seed: self.rng_seed,
        })
    }
}

impl PortConfig {
    pub fn port_direction(&self) -> Result<PortDirection> {
        self.direction.parse()
    }

    pub fn mac_addr(&self) -> Result<Option<MacAddr>> {
        parse_mac(self.mac.as_deref())
    }
}

fn parse_mac(value: Option<&str>) -> Result<Option<MacAddr>> {
    value
        .map(|s| s.parse::<MacAddr>().map_err(|e| Error::Config(e.to_string())))
        .transpose()
}

impl Config {
    /// Engine settings for the `[switch]` section
    pub fn settings(&self) -> Result<SwitchSettings> {
        self.switch.settings()
    }
}

// ============================================================================
// Lock file types (generated, includes all defaults)
// ============================================================================

/// Generated lock file with all defaults filled in
///
/// Uses the same keys as switch.toml, so a lock file loads as a `Config`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigLock {
    pub generated_at: String,
    pub switch: SwitchLock,
    pub ports: BTreeMap<String, PortLock>,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchLock {
    pub mode: String,
    pub hierarchy: String,
    pub is_tor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    pub hello_period_ms: u64,
    pub arp_block_ms: u64,
    pub arp_expire_ms: u64,
    pub arp_sweep_ms: u64,
    pub tcp_expire_ms: u64,
    pub arp_policy: String,
    pub arp_window: String,
    pub elephant_ports: (u16, u16),
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortLock {
    /// Port id the switch will assign; informational
    pub id: u32,
    pub direction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

impl ConfigLock {
    pub fn from_config(config: &Config) -> Self {
        let sw = &config.switch;
        let hierarchy = sw.hierarchy.to_lowercase();

        let switch = SwitchLock {
            mode: sw.mode.to_lowercase(),
            is_tor: sw.is_tor.unwrap_or(hierarchy == "tor"),
            hierarchy,
            mac: sw.mac.clone(),
            hello_period_ms: sw.hello_period().as_millis() as u64,
            arp_block_ms: sw.arp_block().as_millis() as u64,
            arp_expire_ms: sw.arp_expire().as_millis() as u64,
            arp_sweep_ms: sw.arp_sweep().as_millis() as u64,
            tcp_expire_ms: sw.tcp_expire().as_millis() as u64,
            arp_policy: sw.arp_policy.to_lowercase(),
            arp_window: sw.arp_window.to_lowercase(),
            elephant_ports: sw.elephant_range(),
            rng_seed: sw.rng_seed,
        };

        let ports = config
            .ports
            .iter()
            .enumerate()
            .map(|(id, (name, port))| {
                (
                    name.clone(),
                    PortLock {
                        id: id as u32,
                        direction: port.direction.to_lowercase(),
                        mac: port.mac.clone(),
                    },
                )
            })
            .collect();

        ConfigLock {
            generated_at: chrono::Utc::now().to_rfc3339(),
            switch,
            ports,
            log: config.log.clone(),
        }
    }
}
