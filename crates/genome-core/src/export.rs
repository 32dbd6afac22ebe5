//! Lossy export projections of the genome
//!
//! Each format carries the node/edge structure; derived sections stay in the
//! JSON artifact only.

use crate::genome::Genome;
use crate::model::NodeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    GraphMl,
    Dot,
    Csv,
    Cypher,
    PlantUml,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(ExportFormat::Json),
            "graphml" => Some(ExportFormat::GraphMl),
            "dot" => Some(ExportFormat::Dot),
            "csv" => Some(ExportFormat::Csv),
            "cypher" => Some(ExportFormat::Cypher),
            "plantuml" => Some(ExportFormat::PlantUml),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::GraphMl => "graphml",
            ExportFormat::Dot => "dot",
            ExportFormat::Csv => "csv",
            ExportFormat::Cypher => "cypher",
            ExportFormat::PlantUml => "puml",
        }
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn quote_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn to_graphml(genome: &Genome) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n");
    out.push_str("  <key id=\"d0\" for=\"node\" attr.name=\"type\" attr.type=\"string\"/>\n");
    out.push_str("  <key id=\"d1\" for=\"node\" attr.name=\"file\" attr.type=\"string\"/>\n");
    out.push_str("  <key id=\"d2\" for=\"edge\" attr.name=\"type\" attr.type=\"string\"/>\n");
    out.push_str("  <graph id=\"genome\" edgedefault=\"directed\">\n");
    for (id, node) in &genome.nodes {
        out.push_str(&format!(
            "    <node id=\"{}\">\n      <data key=\"d0\">{:?}</data>\n",
            xml_escape(id.as_str()),
            node.node_type
        ));
        if let Some(file) = &node.file {
            out.push_str(&format!("      <data key=\"d1\">{}</data>\n", xml_escape(file)));
        }
        out.push_str("    </node>\n");
    }
    for (i, edge) in genome.edges.iter().enumerate() {
        out.push_str(&format!(
            "    <edge id=\"e{i}\" source=\"{}\" target=\"{}\">\n      <data key=\"d2\">{:?}</data>\n    </edge>\n",
            xml_escape(edge.from.as_str()),
            xml_escape(edge.to.as_str()),
            edge.edge_type
        ));
    }
    out.push_str("  </graph>\n</graphml>\n");
    out
}

pub fn to_dot(genome: &Genome) -> String {
    let mut out = String::from("digraph genome {\n  rankdir=LR;\n");
    for (id, node) in &genome.nodes {
        let shape = match node.node_type {
            NodeType::File => "box",
            NodeType::Class => "component",
            NodeType::Concept => "ellipse",
            _ => "oval",
        };
        out.push_str(&format!(
            "  \"{}\" [shape={shape}];\n",
            quote_escape(id.as_str())
        ));
    }
    for edge in &genome.edges {
        out.push_str(&format!(
            "  \"{}\" -> \"{}\" [label=\"{:?}\"];\n",
            quote_escape(edge.from.as_str()),
            quote_escape(edge.to.as_str()),
            edge.edge_type
        ));
    }
    out.push_str("}\n");
    out
}

/// Paired CSVs: a nodes table and an edges table, separated by a blank line.
pub fn to_csv(genome: &Genome) -> (String, String) {
    let mut nodes = String::from("id,type,file,language,visibility,criticality\n");
    for (id, node) in &genome.nodes {
        nodes.push_str(&format!(
            "{},{:?},{},{},{:?},{}\n",
            csv_escape(id.as_str()),
            node.node_type,
            csv_escape(node.file.as_deref().unwrap_or("")),
            node.language.map(|l| format!("{l:?}")).unwrap_or_default(),
            node.visibility,
            node.criticality.value(),
        ));
    }
    let mut edges = String::from("from,to,type\n");
    for edge in &genome.edges {
        edges.push_str(&format!(
            "{},{},{:?}\n",
            csv_escape(edge.from.as_str()),
            csv_escape(edge.to.as_str()),
            edge.edge_type
        ));
    }
    (nodes, edges)
}

pub fn to_cypher(genome: &Genome) -> String {
    let mut out = String::new();
    for (id, node) in &genome.nodes {
        out.push_str(&format!(
            "MERGE (n:{:?} {{id: \"{}\"{}}});\n",
            node.node_type,
            quote_escape(id.as_str()),
            node.file
                .as_ref()
                .map(|f| format!(", file: \"{}\"", quote_escape(f)))
                .unwrap_or_default(),
        ));
    }
    for edge in &genome.edges {
        let rel = format!("{:?}", edge.edge_type).to_uppercase();
        out.push_str(&format!(
            "MATCH (a {{id: \"{}\"}}), (b {{id: \"{}\"}}) MERGE (a)-[:{rel}]->(b);\n",
            quote_escape(edge.from.as_str()),
            quote_escape(edge.to.as_str()),
        ));
    }
    out
}

pub fn to_plantuml(genome: &Genome) -> String {
    let mut out = String::from("@startuml\n");
    for (i, (id, node)) in genome.nodes.iter().enumerate() {
        if node.node_type == NodeType::File {
            out.push_str(&format!("component \"{}\" as C{i}\n", id.as_str()));
        }
    }
    // Component-level edges only: file-to-file relations.
    let file_index: std::collections::BTreeMap<&str, usize> = genome
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, (_, n))| n.node_type == NodeType::File)
        .map(|(i, (id, _))| (id.as_str(), i))
        .collect();
    for edge in &genome.edges {
        if let (Some(a), Some(b)) = (
            file_index.get(edge.from.as_str()),
            file_index.get(edge.to.as_str()),
        ) {
            out.push_str(&format!("C{a} --> C{b}\n"));
        }
    }
    out.push_str("@enduml\n");
    out
}
