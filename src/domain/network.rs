//! Network view: named networks → interface → address for one node.
//!
//! Discovery-phase nodes only have a DHCP lease, so they short-circuit to a
//! single `[dhcp]` row. Fully known nodes are resolved per network through a
//! [`ConduitResolver`], sorted by network name, with interfaces outside any
//! named network appended as `[not managed]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::attributes::{self, AttrValue};
use super::node::{ConduitInterface, Node, BMC_NETWORK};

pub const DHCP_LABEL: &str = "[dhcp]";
pub const UNMANAGED_LABEL: &str = "[not managed]";
pub const UNKNOWN_INTERFACE: &str = "Unknown";

const BMC_ADDRESS_PATH: [&str; 3] = ["crowbar_wall", "ipmi", "address"];

/// Maps a conduit name to the physical interfaces that back it.
pub trait ConduitResolver: Send + Sync {
    fn conduit_details(&self, node: &Node, conduit: &str) -> Option<ConduitInterface>;
}

/// Reads conduit details materialized on the node document itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeConduits;

impl ConduitResolver for NodeConduits {
    fn conduit_details(&self, node: &Node, conduit: &str) -> Option<ConduitInterface> {
        node.conduits.get(conduit).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub label: String,
    pub value: NetworkValue,
}

/// Tagged on the wire (`{"kind": .., "value": ..}`) because an unmanaged
/// bucket of plain strings is otherwise indistinguishable from interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NetworkValue {
    /// Interface label → address.
    Interfaces(BTreeMap<String, String>),
    /// Interfaces not covered by any named network.
    Unmanaged(BTreeMap<String, AttrValue>),
    /// DHCP placeholder: `discovering`, the lease address, or nothing.
    Address(Option<String>),
}

pub fn resolve(node: &Node, conduits: &dyn ConduitResolver) -> Vec<NetworkEntry> {
    match node.state.as_str() {
        "discovering" => vec![NetworkEntry {
            label: DHCP_LABEL.to_string(),
            value: NetworkValue::Address(Some("discovering".to_string())),
        }],
        "discovered" => vec![NetworkEntry {
            label: DHCP_LABEL.to_string(),
            value: NetworkValue::Address(node.ipaddress.clone()),
        }],
        _ => managed_networks(node, conduits),
    }
}

fn managed_networks(node: &Node, conduits: &dyn ConduitResolver) -> Vec<NetworkEntry> {
    let mut networks: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    for (name, port) in &node.networks {
        let (interface, address) = if name == BMC_NETWORK {
            let address = attributes::resolve(&node.attributes, &BMC_ADDRESS_PATH)
                .ok()
                .and_then(AttrValue::as_str)
                .map(str::to_string);
            (BMC_NETWORK.to_string(), address)
        } else {
            let interface = interface_label(conduits.conduit_details(node, &port.conduit));
            (interface, port.address.clone())
        };

        if let Some(address) = address {
            networks
                .entry(name.clone())
                .or_default()
                .insert(interface, address);
        }
    }

    let mut entries: Vec<NetworkEntry> = networks
        .into_iter()
        .map(|(label, interfaces)| NetworkEntry {
            label,
            value: NetworkValue::Interfaces(interfaces),
        })
        .collect();

    if !node.unmanaged_interfaces.is_empty() {
        entries.push(NetworkEntry {
            label: UNMANAGED_LABEL.to_string(),
            value: NetworkValue::Unmanaged(node.unmanaged_interfaces.clone()),
        });
    }

    entries
}

fn interface_label(details: Option<ConduitInterface>) -> String {
    let Some(ConduitInterface {
        interface: Some(interface),
        members: Some(members),
        ..
    }) = details
    else {
        return UNKNOWN_INTERFACE.to_string();
    };

    if members.len() > 1 {
        format!("{interface}[{}]", members.join(","))
    } else {
        interface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::NetworkPort;
    use serde_json::json;

    fn port(conduit: &str, address: Option<&str>) -> NetworkPort {
        NetworkPort {
            conduit: conduit.to_string(),
            address: address.map(str::to_string),
        }
    }

    fn ready_node() -> Node {
        let mut node = Node::new("n1.example.com", "ready");
        node.networks.insert("admin".into(), port("intf0", Some("192.168.124.81")));
        node.networks.insert("storage".into(), port("intf1", Some("192.168.125.10")));
        node.networks.insert("public".into(), port("intf2", None));
        node.networks.insert("nova_fixed".into(), port("missing", Some("192.168.123.2")));
        node.conduits.insert(
            "intf0".into(),
            ConduitInterface {
                interface: Some("eth0".into()),
                members: Some(vec!["eth0".into()]),
                team_mode: None,
            },
        );
        node.conduits.insert(
            "intf1".into(),
            ConduitInterface {
                interface: Some("bond0".into()),
                members: Some(vec!["eth1".into(), "eth2".into()]),
                team_mode: Some(5),
            },
        );
        node
    }

    #[test]
    fn discovering_ignores_networks() {
        let mut node = ready_node();
        node.state = "discovering".into();
        let entries = resolve(&node, &NodeConduits);
        assert_eq!(
            entries,
            vec![NetworkEntry {
                label: "[dhcp]".into(),
                value: NetworkValue::Address(Some("discovering".into())),
            }]
        );
    }

    #[test]
    fn discovered_reports_lease() {
        let mut node = ready_node();
        node.state = "discovered".into();
        node.ipaddress = Some("192.168.124.200".into());
        let entries = resolve(&node, &NodeConduits);
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].value,
            NetworkValue::Address(Some("192.168.124.200".into()))
        );
    }

    #[test]
    fn managed_networks_sorted_and_labelled() {
        let entries = resolve(&ready_node(), &NodeConduits);
        let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
        // `public` has no address and is dropped
        assert_eq!(labels, vec!["admin", "nova_fixed", "storage"]);

        let interfaces = |i: usize| match &entries[i].value {
            NetworkValue::Interfaces(map) => map.clone(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(interfaces(0).get("eth0").map(String::as_str), Some("192.168.124.81"));
        assert!(interfaces(1).contains_key("Unknown"));
        assert!(interfaces(2).contains_key("bond0[eth1,eth2]"));
    }

    #[test]
    fn bmc_reads_management_address() {
        let mut node = ready_node();
        node.networks.insert("bmc".into(), port("bmc", None));
        node.attributes = AttrValue::from(json!({
            "crowbar_wall": { "ipmi": { "address": "10.1.1.1" } }
        }));
        let entries = resolve(&node, &NodeConduits);
        let bmc = entries.iter().find(|e| e.label == "bmc").unwrap();
        let NetworkValue::Interfaces(map) = &bmc.value else {
            panic!("bmc should map interfaces");
        };
        assert_eq!(map.get("bmc").map(String::as_str), Some("10.1.1.1"));
    }

    #[test]
    fn bmc_without_address_is_skipped() {
        let mut node = ready_node();
        node.networks.insert("bmc".into(), port("bmc", Some("ignored")));
        let entries = resolve(&node, &NodeConduits);
        assert!(entries.iter().all(|e| e.label != "bmc"));
    }

    #[test]
    fn unmanaged_bucket_is_last() {
        let mut node = ready_node();
        node.unmanaged_interfaces
            .insert("eth9".into(), AttrValue::text("00:11:22:33:44:55"));
        let entries = resolve(&node, &NodeConduits);
        assert_eq!(entries.last().unwrap().label, "[not managed]");
    }

    #[test]
    fn value_kind_survives_the_wire() {
        let mut node = ready_node();
        node.unmanaged_interfaces
            .insert("eth9".into(), AttrValue::from(json!("10.0.0.9")));
        let entries = resolve(&node, &NodeConduits);

        let wire = serde_json::to_string(&entries).unwrap();
        let back: Vec<NetworkEntry> = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, entries);
        let unmanaged = back.last().unwrap();
        assert_eq!(unmanaged.label, UNMANAGED_LABEL);
        assert!(matches!(unmanaged.value, NetworkValue::Unmanaged(_)));

        let json = serde_json::to_value(NetworkValue::Address(None)).unwrap();
        assert_eq!(json, json!({"kind": "address", "value": null}));
    }
}
