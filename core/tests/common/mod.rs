#![allow(dead_code)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use byteorder::{WriteBytesExt, LE};
use cachenet_core::internal::*;
use cachenet_core::model::weights;

pub fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("CACHENET_LOG").try_init();
}

#[derive(Debug, Clone)]
pub struct LayerDesc {
    pub type_name: String,
    pub type_index: i32,
    pub name: String,
    pub bottoms: Vec<usize>,
    pub tops: Vec<usize>,
    pub params: ParamDict,
}

/// A graph written once, serialized to both parameter formats.
#[derive(Debug, Clone, Default)]
pub struct GraphDesc {
    pub blobs: Vec<String>,
    pub layers: Vec<LayerDesc>,
}

impl GraphDesc {
    fn blob(&mut self, name: &str) -> usize {
        match self.blobs.iter().position(|b| b == name) {
            Some(ix) => ix,
            None => {
                self.blobs.push(name.to_string());
                self.blobs.len() - 1
            }
        }
    }

    pub fn custom(
        &mut self,
        type_name: &str,
        type_index: i32,
        name: &str,
        bottoms: &[&str],
        tops: &[&str],
        params: &ParamDict,
    ) -> &mut Self {
        let bottoms = bottoms.iter().map(|b| self.blob(b)).collect();
        let tops = tops
            .iter()
            .map(|t| {
                self.blobs.push(t.to_string());
                self.blobs.len() - 1
            })
            .collect();
        self.layers.push(LayerDesc {
            type_name: type_name.to_string(),
            type_index,
            name: name.to_string(),
            bottoms,
            tops,
            params: params.clone(),
        });
        self
    }

    pub fn layer(
        &mut self,
        layer_type: LayerType,
        name: &str,
        bottoms: &[&str],
        tops: &[&str],
        params: &ParamDict,
    ) -> &mut Self {
        self.custom(layer_type.name(), layer_type.index(), name, bottoms, tops, params)
    }

    pub fn input(&mut self, name: &str, c: i32, h: i32, w: i32) -> &mut Self {
        let mut pd = ParamDict::default();
        pd.set(0, w).set(1, h).set(2, c);
        self.layer(LayerType::Input, name, &[], &[name], &pd)
    }

    pub fn to_text(&self) -> String {
        let mut text = format!("{} {}\n", self.layers.len(), self.blobs.len());
        for l in &self.layers {
            text += &format!("{} {} {} {}", l.type_name, l.name, l.bottoms.len(), l.tops.len());
            for b in l.bottoms.iter().chain(l.tops.iter()) {
                text += &format!(" {}", self.blobs[*b]);
            }
            if !l.params.is_empty() {
                text += &format!(" {}", l.params.write_text());
            }
            text += "\n";
        }
        text
    }

    pub fn to_bin(&self) -> Vec<u8> {
        let mut buf = vec![];
        buf.write_i32::<LE>(self.layers.len() as i32).unwrap();
        buf.write_i32::<LE>(self.blobs.len() as i32).unwrap();
        for l in &self.layers {
            buf.write_i32::<LE>(l.type_index).unwrap();
            buf.write_i32::<LE>(l.bottoms.len() as i32).unwrap();
            buf.write_i32::<LE>(l.tops.len() as i32).unwrap();
            for b in l.bottoms.iter().chain(l.tops.iter()) {
                buf.write_i32::<LE>(*b as i32).unwrap();
            }
            l.params.write_bin(&mut buf).unwrap();
        }
        buf
    }

    pub fn text_graph(&self) -> Graph {
        let mut graph = Graph::default();
        graph.load_param_text(self.to_text().as_bytes()).unwrap();
        graph
    }

    pub fn bin_graph(&self) -> Graph {
        let mut graph = Graph::default();
        graph.load_param_bin(&*self.to_bin()).unwrap();
        graph
    }
}

/// A copy of some bytes at a chosen offset from a 4-byte boundary.
pub struct Placed {
    storage: Vec<u32>,
    offset: usize,
    len: usize,
}

impl Placed {
    pub fn new(bytes: &[u8], offset: usize) -> Placed {
        let mut storage = vec![0u32; (offset + bytes.len()) / 4 + 1];
        // SAFETY: u8 has no alignment requirement and the view covers the vec exactly
        let view = unsafe {
            std::slice::from_raw_parts_mut(storage.as_mut_ptr() as *mut u8, storage.len() * 4)
        };
        view[offset..][..bytes.len()].copy_from_slice(bytes);
        Placed { storage, offset, len: bytes.len() }
    }

    pub fn bytes(&self) -> &[u8] {
        // SAFETY: as above
        let all = unsafe {
            std::slice::from_raw_parts(self.storage.as_ptr() as *const u8, self.storage.len() * 4)
        };
        &all[self.offset..][..self.len]
    }
}

/// Weight records for the layers of a graph description, in order. An
/// empty bias writes no bias record.
pub fn weights_for(records: &[(Vec<f32>, Vec<f32>)]) -> Vec<u8> {
    let mut buf = vec![];
    for (weights, bias) in records {
        weights::write::f32_record(&mut buf, weights).unwrap();
        if !bias.is_empty() {
            weights::write::raw_record(&mut buf, bias).unwrap();
        }
    }
    buf
}

/// Identity layer counting its invocations.
#[derive(Debug, Clone)]
pub struct Counter {
    pub calls: Arc<AtomicUsize>,
    pub inplace: bool,
}

impl Counter {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Layer for Counter {
    fn name(&self) -> Cow<str> {
        "Counter".into()
    }

    fn one_blob_only(&self) -> bool {
        true
    }

    fn support_inplace(&self) -> bool {
        self.inplace
    }

    fn forward_one(&self, input: TValue) -> CnResult<TValue> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(input)
    }

    fn forward_inplace_one(&self, _tensor: &mut Tensor) -> CnResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Register `Counter` on a graph, returning its type index and the shared
/// call counter.
pub fn register_counter(graph: &mut Graph, name: &str, inplace: bool) -> (i32, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let shared = calls.clone();
    let index = graph
        .register_custom_layer(name, move || {
            Box::new(Counter { calls: shared.clone(), inplace }) as Box<dyn Layer>
        })
        .unwrap();
    (index, calls)
}
