//! Configuration validation

use super::{Config, SwitchConfig};
use crate::dataplane::{ArpLookupPolicy, ArpWindowPolicy, HierarchyRole, SwitchMode};
use crate::telemetry::is_known_level;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_names(&config.switch, &mut result);
    validate_timers(&config.switch, &mut result);
    validate_elephant_range(&config.switch, &mut result);
    validate_ports(config, &mut result);

    if !is_known_level(&config.log.level) {
        result.warn(format!(
            "log.level: unknown level '{}', using info",
            config.log.level
        ));
    }

    result
}

fn validate_names(sw: &SwitchConfig, result: &mut ValidationResult) {
    if sw.mode.parse::<SwitchMode>().is_err() {
        result.error(format!(
            "switch.mode: unknown mode '{}' (expected arp-path, tcp-path or hybrid)",
            sw.mode
        ));
    }
    if sw.arp_policy.parse::<ArpLookupPolicy>().is_err() {
        result.error(format!(
            "switch.arp_policy: unknown policy '{}' (expected mobility or strict)",
            sw.arp_policy
        ));
    }
    if sw.arp_window.parse::<ArpWindowPolicy>().is_err() {
        result.error(format!(
            "switch.arp_window: unknown window '{}' (expected by-kind or always-block)",
            sw.arp_window
        ));
    }
    if let Err(e) = sw.mac_addr() {
        result.error(format!("switch.mac: {}", e));
    }

    match sw.hierarchy_role() {
        Ok(role) => {
            if let Some(is_tor) = sw.is_tor {
                if is_tor != (role == HierarchyRole::Tor) {
                    result.warn(format!(
                        "switch.is_tor: {} does not match hierarchy '{}'",
                        is_tor, role
                    ));
                }
            }
        }
        Err(_) => result.error(format!(
            "switch.hierarchy: unknown role '{}' (expected core, aggr or tor)",
            sw.hierarchy
        )),
    }
}

fn validate_timers(sw: &SwitchConfig, result: &mut ValidationResult) {
    let periods = [
        ("hello_period_ms", sw.hello_period_ms),
        ("arp_block_ms", sw.arp_block_ms),
        ("arp_expire_ms", sw.arp_expire_ms),
        ("arp_sweep_ms", sw.arp_sweep_ms),
        ("tcp_expire_ms", sw.tcp_expire_ms),
    ];
    for (key, value) in periods {
        if value == Some(0) {
            result.error(format!("switch.{}: must be greater than zero", key));
        }
    }

    if sw.arp_block() >= sw.arp_expire() {
        result.warn(format!(
            "switch.arp_block_ms: blocking window ({} ms) is not shorter than arp_expire_ms ({} ms)",
            sw.arp_block().as_millis(),
            sw.arp_expire().as_millis()
        ));
    }

    if sw.arp_sweep() > sw.arp_expire() {
        result.warn(format!(
            "switch.arp_sweep_ms: sweeping every {} ms keeps lapsed bindings around longer than arp_expire_ms",
            sw.arp_sweep().as_millis()
        ));
    }
}

fn validate_elephant_range(sw: &SwitchConfig, result: &mut ValidationResult) {
    let (low, high) = sw.elephant_range();
    if low > high {
        result.error(format!(
            "switch.elephant_ports: invalid range - start ({}) > end ({})",
            low, high
        ));
    }
}

fn validate_ports(config: &Config, result: &mut ValidationResult) {
    if config.ports.is_empty() {
        result.error("ports: at least one port is required");
    }

    for (name, port) in &config.ports {
        if port.port_direction().is_err() {
            result.error(format!(
                "ports.{}: unknown direction '{}' (expected upper or lower)",
                name, port.direction
            ));
        }
        if let Err(e) = port.mac_addr() {
            result.error(format!("ports.{}.mac: {}", name, e));
        }
    }

    let has_upper = config
        .ports
        .values()
        .any(|p| p.direction.eq_ignore_ascii_case("upper"));
    if config.switch.hierarchy.eq_ignore_ascii_case("core") && has_upper {
        result.warn("ports: a core switch floods in every direction; 'upper' has no effect");
    }
}
