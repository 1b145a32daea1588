//! Lazy evaluation of a graph.
//!
//! An `Extractor` holds the values of one inference round. Asking for a
//! blob runs its producer, after recursively running the producers of its
//! missing inputs: only what the requested outputs depend on is computed,
//! and each layer at most once per round.
use crate::internal::*;
use crate::model::Node;
use crate::multithread::multithread_scope;

mod cache;

pub use self::cache::RegionCache;

#[derive(Debug)]
pub struct Extractor<'g> {
    graph: &'g Graph,
    values: Vec<Option<TValue>>,
    /// Reads still expected on each bound value, used by light mode.
    pending: Vec<usize>,
    light_mode: bool,
    num_threads: usize,
    executor: Option<Executor>,
    cache_mode: bool,
    cache: RegionCache,
}

impl<'g> Extractor<'g> {
    pub fn new(graph: &'g Graph) -> Extractor<'g> {
        Extractor {
            graph,
            values: vec![None; graph.blobs.len()],
            pending: vec![0; graph.blobs.len()],
            light_mode: graph.config.light_mode,
            num_threads: graph.config.num_threads,
            executor: None,
            cache_mode: graph.config.cache_mode,
            cache: RegionCache::new(graph.blobs.len(), graph.nodes.len()),
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Release blobs as soon as a layer read them. In-place capable layers
    /// then work directly on the released buffers.
    pub fn set_light_mode(&mut self, light_mode: bool) {
        self.light_mode = light_mode;
    }

    /// Worker count used inside layers while extracting. 0 keeps the
    /// current executor.
    pub fn set_num_threads(&mut self, num_threads: usize) {
        if num_threads != self.num_threads {
            self.num_threads = num_threads;
            self.executor = None;
        }
    }

    /// Track changed regions and let caching layers reuse their previous
    /// output.
    pub fn set_cache_mode(&mut self, cache_mode: bool) {
        self.cache_mode = cache_mode;
    }

    fn check_blob(&self, blob: usize) -> CnResult<()> {
        ensure!(blob < self.values.len(), "Blob index {} out of range ({} blobs)", blob, self.values.len());
        Ok(())
    }

    fn blob_by_name(&self, name: &str) -> CnResult<usize> {
        self.graph.blob_index(name).ok_or_else(|| format_err!("No blob named {:?}", name))
    }

    pub fn input(&mut self, blob: usize, value: impl IntoTValue) -> CnResult<()> {
        self.check_blob(blob)?;
        self.bind(blob, value.into_tvalue());
        Ok(())
    }

    fn bind(&mut self, blob: usize, value: TValue) {
        self.values[blob] = Some(value);
        self.pending[blob] = self.graph.blobs[blob].consumers.len();
    }

    /// Count one read of a blob. In light mode the value leaves the table
    /// with its last expected read.
    fn consume(&mut self, blob: usize) -> Option<TValue> {
        if !self.light_mode {
            return self.values[blob].clone();
        }
        self.pending[blob] = self.pending[blob].saturating_sub(1);
        if self.pending[blob] == 0 {
            self.values[blob].take()
        } else {
            self.values[blob].clone()
        }
    }

    pub fn input_by_name(&mut self, name: &str, value: impl IntoTValue) -> CnResult<()> {
        let blob = self.blob_by_name(name)?;
        self.input(blob, value)
    }

    /// Declare what changed in a blob since the previous round.
    pub fn input_region(&mut self, blob: usize, region: Region) -> CnResult<()> {
        self.check_blob(blob)?;
        self.cache.set_region(blob, region);
        Ok(())
    }

    pub fn input_region_by_name(&mut self, name: &str, region: Region) -> CnResult<()> {
        let blob = self.blob_by_name(name)?;
        self.input_region(blob, region)
    }

    pub fn is_defined(&self, blob: usize) -> bool {
        self.values.get(blob).map(|v| v.is_some()).unwrap_or(false)
    }

    /// Changed region of a blob in the current round.
    pub fn region(&self, blob: usize) -> Option<&Region> {
        (blob < self.values.len()).then(|| self.cache.region(blob))
    }

    /// Previous round output of a caching node.
    pub fn cached(&self, node: usize) -> Option<&TValue> {
        (node < self.graph.nodes.len()).then(|| self.cache.cached(node)).flatten()
    }

    fn executor(&mut self) -> CnResult<Option<Executor>> {
        if self.num_threads == 0 {
            return Ok(None);
        }
        if self.executor.is_none() {
            self.executor = Some(Executor::multithread(self.num_threads)?);
        }
        Ok(self.executor.clone())
    }

    /// Value of a blob, computing it if needed.
    pub fn extract(&mut self, blob: usize) -> CnResult<TValue> {
        self.check_blob(blob)?;
        if self.values[blob].is_none() {
            let producer = self.graph.blobs[blob]
                .producer
                .ok_or_else(|| format_err!("Blob {} is a graph input and has no value bound", blob))?;
            match self.executor()? {
                Some(executor) => multithread_scope(executor, || self.forward_layer(producer))?,
                None => self.forward_layer(producer)?,
            }
        }
        self.values[blob]
            .clone()
            .ok_or_else(|| format_err!("Blob {} was not computed by its producer", blob))
    }

    pub fn extract_by_name(&mut self, name: &str) -> CnResult<TValue> {
        let blob = self.blob_by_name(name)?;
        self.extract(blob)
    }

    /// Read the value of bottom `ix` of `node`, computing it first if
    /// needed.
    fn gather(&mut self, node: &Node, ix: usize, gathered: &[TValue]) -> CnResult<TValue> {
        let blob = node.bottoms[ix];
        if self.light_mode {
            if let Some(earlier) = node.bottoms[..ix].iter().position(|&b| b == blob) {
                self.consume(blob);
                return Ok(gathered[earlier].clone());
            }
        }
        if self.values[blob].is_none() {
            let producer = self.graph.blobs[blob]
                .producer
                .ok_or_else(|| format_err!("Blob {} needed by {} has no value bound", blob, node))?;
            self.forward_layer(producer)?;
        }
        self.consume(blob).ok_or_else(|| format_err!("Blob {} was not computed by its producer", blob))
    }

    fn forward_layer(&mut self, ix: usize) -> CnResult<()> {
        let graph = self.graph;
        let node = &graph.nodes[ix];
        let mut inputs: TVec<TValue> = TVec::new();
        for bottom in 0..node.bottoms.len() {
            let value = self.gather(node, bottom, &inputs)?;
            inputs.push(value);
        }
        trace!("Evaluating {}", node);
        let outputs = self.run_layer(node, inputs).with_context(|| format!("Evaluating {node}"))?;
        for (&top, value) in node.tops.iter().zip(outputs) {
            self.bind(top, value);
        }
        Ok(())
    }

    fn propagate_regions(&mut self, node: &Node) {
        let bottoms: TVec<Region> = node.bottoms.iter().map(|&b| self.cache.region(b).clone()).collect();
        let tops = match node.layer.propagate_region(&bottoms, node.tops.len()) {
            Ok(tops) if tops.len() == node.tops.len() => tops,
            Ok(tops) => {
                warn!("{} propagated {} regions for {} tops", node, tops.len(), node.tops.len());
                tvec![Region::Full; node.tops.len()]
            }
            Err(e) => {
                warn!("Region propagation failed on {}: {:?}", node, e);
                tvec![Region::Full; node.tops.len()]
            }
        };
        for (&top, region) in node.tops.iter().zip(tops) {
            trace!("  region of blob {}: {}", top, region);
            self.cache.set_region(top, region);
        }
    }

    fn run_layer(&mut self, node: &Node, inputs: TVec<TValue>) -> CnResult<TVec<TValue>> {
        let layer = node.layer();
        if self.cache_mode {
            self.propagate_regions(node);
        }
        let outputs: TVec<TValue> = if layer.one_blob_only() {
            ensure!(
                inputs.len() == 1 && node.tops.len() == 1,
                "{} takes one input and one output, wired to {} and {}",
                layer.name(),
                inputs.len(),
                node.tops.len()
            );
            let input = inputs.into_iter().next().ok_or_else(|| format_err!("Missing input"))?;
            let output = if self.cache_mode && layer.needs_cache() {
                let region = self.cache.region(node.tops[0]).clone();
                let output = layer.forward_cached(input, self.cache.cached(node.id), &region)?;
                self.cache.record(node.id, output.clone());
                output
            } else if self.light_mode && layer.support_inplace() {
                let mut tensor = input.into_tensor();
                layer.forward_inplace_one(&mut tensor)?;
                tensor.into()
            } else {
                layer.forward_one(input)?
            };
            tvec!(output)
        } else if self.light_mode && layer.support_inplace() {
            let mut tensors: TVec<Tensor> = inputs.into_iter().map(|t| t.into_tensor()).collect();
            layer.forward_inplace(&mut tensors)?;
            tensors.into_iter().map(|t| t.into()).collect()
        } else {
            layer.forward(inputs, node.tops.len())?
        };
        ensure!(
            outputs.len() == node.tops.len(),
            "{} produced {} outputs for {} tops",
            layer.name(),
            outputs.len(),
            node.tops.len()
        );
        Ok(outputs)
    }

    /// Forget every value and region of the current round. Cached outputs
    /// are kept for the next one.
    pub fn clear_blob_data(&mut self) {
        self.values.iter_mut().for_each(|v| *v = None);
        self.pending.iter_mut().for_each(|p| *p = 0);
        self.cache.reset_regions();
    }

    /// Keep the outputs computed by caching layers during this round for
    /// the next one. Caching layers that did not run this round drop their
    /// previous output.
    pub fn update_cache(&mut self) {
        self.cache.commit();
        debug!("{} layer output(s) cached", self.cache.cached_count());
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}
