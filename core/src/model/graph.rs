use std::fmt;

use itertools::Itertools;

use crate::internal::*;

/// A slot carrying one tensor between layers.
///
/// Blobs only hold topology. Their values live in an `Extractor`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blob {
    pub name: Option<String>,
    /// Index of the producing node, None for graph inputs.
    pub producer: Option<usize>,
    /// Indices of the consuming nodes, in declaration order.
    pub consumers: TVec<usize>,
}

#[derive(Debug)]
pub struct Node {
    pub id: usize,
    pub type_index: i32,
    pub name: Option<String>,
    pub bottoms: TVec<usize>,
    pub tops: TVec<usize>,
    pub layer: Box<dyn Layer>,
}

impl Node {
    pub fn layer(&self) -> &dyn Layer {
        &*self.layer
    }

    pub fn layer_as<L: Layer>(&self) -> Option<&L> {
        self.layer().downcast_ref::<L>()
    }

    pub fn layer_is<L: Layer>(&self) -> bool {
        self.layer_as::<L>().is_some()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match &self.name {
            Some(name) => write!(fmt, "#{} \"{}\" {}", self.id, name, self.layer.name()),
            None => write!(fmt, "#{} {}", self.id, self.layer.name()),
        }
    }
}

/// A loaded layer graph.
///
/// Nodes are stored in a topological order: every bottom of a node is a
/// graph input or the top of an earlier node. Once loaded, a graph is only
/// read: extractors borrow it, and several of them can run concurrently.
#[derive(Debug, Default)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub blobs: Vec<Blob>,
    pub registry: LayerRegistry,
    /// Defaults of the extractors created by `extractor()`.
    pub config: ExtractorConfig,
}

impl Graph {
    pub fn with_config(config: ExtractorConfig) -> Graph {
        Graph { config, ..Graph::default() }
    }

    /// See `LayerRegistry::register_custom_layer`.
    pub fn register_custom_layer(
        &mut self,
        name: &str,
        creator: impl Fn() -> Box<dyn Layer> + Send + Sync + 'static,
    ) -> CnResult<i32> {
        self.registry.register_custom_layer(name, creator)
    }

    /// See `LayerRegistry::register_custom_layer_index`.
    pub fn register_custom_layer_index(
        &mut self,
        type_index: i32,
        creator: impl Fn() -> Box<dyn Layer> + Send + Sync + 'static,
    ) -> CnResult<()> {
        self.registry.register_custom_layer_index(type_index, creator)
    }

    pub fn blob_index(&self, name: &str) -> Option<usize> {
        let ix = self.blobs.iter().position(|b| b.name.as_deref() == Some(name));
        if ix.is_none() {
            warn!("No blob named {:?}", name);
        }
        ix
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        let ix = self.nodes.iter().position(|n| n.name.as_deref() == Some(name));
        if ix.is_none() {
            warn!("No layer named {:?}", name);
        }
        ix
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.node_index(name).map(|ix| &self.nodes[ix])
    }

    /// Blobs no layer produces.
    pub fn input_blobs(&self) -> Vec<usize> {
        (0..self.blobs.len()).filter(|&ix| self.blobs[ix].producer.is_none()).collect()
    }

    /// Blobs no layer consumes.
    pub fn output_blobs(&self) -> Vec<usize> {
        (0..self.blobs.len()).filter(|&ix| self.blobs[ix].consumers.is_empty()).collect()
    }

    /// Drop nodes and blobs. Custom layers stay registered.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.blobs.clear();
    }

    /// A fresh execution context over this graph.
    pub fn extractor(&self) -> Extractor<'_> {
        Extractor::new(self)
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        for node in &self.nodes {
            let slot = |ix: &usize| match &self.blobs[*ix].name {
                Some(name) => format!("{ix}:{name}"),
                None => ix.to_string(),
            };
            writeln!(
                fmt,
                "{} [{}] -> [{}] {}",
                node,
                node.bottoms.iter().map(slot).join(", "),
                node.tops.iter().map(slot).join(", "),
                node.layer.info().join(" ")
            )?;
        }
        Ok(())
    }
}
