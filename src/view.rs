use crate::format::{format_byte_size, format_count, format_uptime};
use crate::model::{parse_record, BridgeRecord, StructuralError, Variant, VmRecord};
use serde::Serialize;
use serde_json::Value;

const MAX_LISTED_INTERFACES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardViewModel {
    pub title: String,
    pub state_label: String,
    pub state_class: String,
    pub metrics: Vec<Metric>,
    pub detail_rows: Vec<DetailRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailRow {
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emphasis_class: Option<String>,
}

impl Metric {
    fn new(label: &str, value: String, subtitle: Option<String>) -> Self {
        Self {
            label: label.to_string(),
            value,
            subtitle,
        }
    }
}

impl DetailRow {
    fn new(label: &str, value: String) -> Self {
        Self {
            label: label.to_string(),
            value,
            emphasis_class: None,
        }
    }

    fn emphasized(mut self, class: &str) -> Self {
        self.emphasis_class = Some(class.to_string());
        self
    }
}

/// Projects one raw entity record into a card. Missing optional fields take
/// their defaults; missing `name`/`status` is a structural error.
pub fn build_card(
    variant: Variant,
    index: usize,
    raw: &Value,
) -> Result<CardViewModel, StructuralError> {
    match variant {
        Variant::Bridges => parse_record(index, raw).map(|r| bridge_card(&r)),
        Variant::Vms => parse_record(index, raw).map(|r| vm_card(&r)),
    }
}

fn bridge_card(bridge: &BridgeRecord) -> CardViewModel {
    let state = Variant::Bridges.profile().classifier.classify(&bridge.status);
    let stp_class = if bridge.stp_state == "enabled" {
        "stp-enabled"
    } else {
        "stp-disabled"
    };

    CardViewModel {
        title: bridge.name.clone(),
        state_label: state.state_label,
        state_class: state.state_class.to_string(),
        metrics: vec![
            Metric::new(
                "RX",
                format_byte_size(bridge.rx_bytes),
                Some(format!("{} packets", format_count(bridge.rx_packets))),
            ),
            Metric::new(
                "TX",
                format_byte_size(bridge.tx_bytes),
                Some(format!("{} packets", format_count(bridge.tx_packets))),
            ),
        ],
        detail_rows: vec![
            DetailRow::new("Interfaces", interface_summary(&bridge.interfaces)),
            DetailRow::new("STP State", bridge.stp_state.clone()).emphasized(stp_class),
            DetailRow::new(
                "Errors",
                format!("RX: {}, TX: {}", bridge.rx_errors, bridge.tx_errors),
            ),
            DetailRow::new(
                "Dropped",
                format!("RX: {}, TX: {}", bridge.rx_dropped, bridge.tx_dropped),
            ),
        ],
    }
}

fn vm_card(vm: &VmRecord) -> CardViewModel {
    let state = Variant::Vms.profile().classifier.classify(&vm.status);

    CardViewModel {
        title: vm.name.clone(),
        state_label: state.state_label,
        state_class: state.state_class.to_string(),
        metrics: vec![
            Metric::new("CPU", format!("{}%", vm.cpu_percent.unwrap_or(0.0)), None),
            Metric::new("Memory (MB)", vm.memory_mb.unwrap_or(0.0).to_string(), None),
        ],
        detail_rows: vec![
            DetailRow::new(
                "PID",
                vm.pid
                    .filter(|pid| *pid != 0)
                    .map_or_else(|| "N/A".to_string(), |pid| pid.to_string()),
            ),
            DetailRow::new("Uptime", format_uptime(vm.uptime.as_deref())),
            DetailRow::new(
                "Network",
                non_empty_or(vm.network_interfaces.as_deref(), "default"),
            ),
            DetailRow::new("Type", non_empty_or(vm.vm_type.as_deref(), "nexus9000v")),
        ],
    }
}

fn interface_summary(interfaces: &[String]) -> String {
    if interfaces.is_empty() {
        return "None".to_string();
    }
    let shown = interfaces
        .iter()
        .take(MAX_LISTED_INTERFACES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if interfaces.len() > MAX_LISTED_INTERFACES {
        format!("{shown}...")
    } else {
        shown
    }
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}
