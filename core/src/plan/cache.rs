use crate::internal::*;

/// Region bookkeeping of one extractor: the changed region of every blob
/// for the current round, and the previous outputs of the layers that
/// asked for caching.
#[derive(Debug, Clone, Default)]
pub struct RegionCache {
    regions: Vec<Region>,
    /// Outputs of the previous round, per node.
    outputs: Vec<Option<TValue>>,
    /// Outputs computed during the current round, per node.
    fresh: Vec<Option<TValue>>,
}

impl RegionCache {
    pub fn new(blob_count: usize, node_count: usize) -> RegionCache {
        RegionCache {
            regions: vec![Region::Full; blob_count],
            outputs: vec![None; node_count],
            fresh: vec![None; node_count],
        }
    }

    pub fn region(&self, blob: usize) -> &Region {
        &self.regions[blob]
    }

    pub fn set_region(&mut self, blob: usize, region: Region) {
        self.regions[blob] = region;
    }

    /// Start a new round: every blob is dirty until told otherwise.
    pub fn reset_regions(&mut self) {
        self.regions.iter_mut().for_each(|r| *r = Region::Full);
        self.fresh.iter_mut().for_each(|f| *f = None);
    }

    /// Previous round output of a node.
    pub fn cached(&self, node: usize) -> Option<&TValue> {
        self.outputs[node].as_ref()
    }

    pub fn record(&mut self, node: usize, output: TValue) {
        self.fresh[node] = Some(output);
    }

    /// Promote the outputs of the current round. Nodes that did not run
    /// lose their entry, as it no longer matches the previous round.
    pub fn commit(&mut self) {
        for (output, fresh) in self.outputs.iter_mut().zip(self.fresh.iter_mut()) {
            *output = fresh.take();
        }
    }

    pub fn clear(&mut self) {
        self.outputs.iter_mut().for_each(|o| *o = None);
        self.fresh.iter_mut().for_each(|f| *f = None);
    }

    pub fn cached_count(&self) -> usize {
        self.outputs.iter().filter(|o| o.is_some()).count()
    }
}
