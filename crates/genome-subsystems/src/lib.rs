//! Auxiliary subsystems: flows, concepts, history, contracts, tests, risk
//!
//! Each subsystem reads an immutable base graph and owns exactly one genome
//! section. All are individually disableable; a disabled subsystem leaves
//! its section out and every invariant still holds.

pub mod concepts;
pub mod contracts;
pub mod flows;
pub mod history;
pub mod risk;
pub mod test_links;

use genome_core::{BaseGraph, EngineConfig, HistorySource, SubsystemOutputs};

/// Which subsystems an update run must re-execute. A full scan runs all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsystemMask {
    pub flows: bool,
    pub concepts: bool,
    pub history: bool,
    pub contracts: bool,
    pub test_links: bool,
    pub risk: bool,
}

impl SubsystemMask {
    pub fn all() -> Self {
        SubsystemMask {
            flows: true,
            concepts: true,
            history: true,
            contracts: true,
            test_links: true,
            risk: true,
        }
    }

    pub fn none() -> Self {
        SubsystemMask {
            flows: false,
            concepts: false,
            history: false,
            contracts: false,
            test_links: false,
            risk: false,
        }
    }

    pub fn any(&self) -> bool {
        self.flows || self.concepts || self.history || self.contracts || self.test_links || self.risk
    }
}

/// Run the subsystems selected by both the config toggles and the mask.
pub fn run(
    base: &BaseGraph,
    config: &EngineConfig,
    history_source: &dyn HistorySource,
    mask: &SubsystemMask,
) -> SubsystemOutputs {
    let toggles = &config.subsystems;
    let mut outputs = SubsystemOutputs::default();

    if toggles.flows && mask.flows {
        outputs.flows = Some(flows::derive(base, config));
    }
    if toggles.concepts && mask.concepts {
        outputs.concepts = Some(concepts::derive(base));
    }
    if toggles.history && mask.history {
        outputs.history = Some(history::derive(base, history_source));
    }
    if toggles.contracts && mask.contracts {
        outputs.contracts = Some(contracts::derive(base));
    }
    if toggles.test_links && mask.test_links {
        outputs.test_edges = Some(test_links::derive(base));
    }
    if toggles.risk && mask.risk {
        // Risk reads the history output when that subsystem also ran.
        let empty = std::collections::BTreeMap::new();
        let history_ref = outputs.history.as_ref().unwrap_or(&empty);
        outputs.risk = Some(risk::derive(base, history_ref));
    }
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use genome_core::{Node, NodeId, NodeType, StaticHistory};

    fn base() -> BaseGraph {
        let mut base = BaseGraph::new();
        let mut n = Node::new(NodeId::from("main.py"), NodeType::File);
        n.file = Some("main.py".into());
        n.entry_point = true;
        base.add_node(n);
        base
    }

    #[test]
    fn disabled_subsystem_omits_its_section() {
        let mut config = EngineConfig::default();
        config.subsystems.flows = false;
        let outputs = run(&base(), &config, &StaticHistory::new(), &SubsystemMask::all());
        assert!(outputs.flows.is_none());
        assert!(outputs.concepts.is_some());
    }

    #[test]
    fn mask_skips_subsystems() {
        let config = EngineConfig::default();
        let mut mask = SubsystemMask::none();
        mask.history = true;
        let outputs = run(&base(), &config, &StaticHistory::new(), &mask);
        assert!(outputs.flows.is_none());
        assert!(outputs.history.is_some());
    }
}
