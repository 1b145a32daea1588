//! Graph loading: parameters (text, binary, memory) then weights.
//!
//! Parameter loading is best effort: a layer that fails to load is skipped
//! and reported, the following ones still load, and the call fails at the
//! end. Weight loading stops at the first failing layer.
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

use byteorder::{ReadBytesExt, LE};

use super::{Blob, Graph, Node, StreamModelBin};
use crate::internal::*;

/// Bound on per-layer bottom and top counts read from untrusted streams.
const MAX_LAYER_ARITY: i32 = 1 << 16;

/// Memory inputs must start on a 4-byte boundary.
fn check_aligned(mem: &[u8]) -> CnResult<()> {
    if mem.as_ptr() as usize % 4 != 0 {
        error!("Rejecting buffer at {:p}: not aligned on 4 bytes", mem.as_ptr());
        bail!("Buffer at {:p} is not aligned on 4 bytes", mem.as_ptr());
    }
    Ok(())
}

fn read_count<R: Read + ?Sized>(r: &mut R, what: &str, max: i32) -> CnResult<usize> {
    let n = r.read_i32::<LE>().with_context(|| format!("Reading {what}"))?;
    ensure!((0..=max).contains(&n), "Invalid {} {}", what, n);
    Ok(n as usize)
}

/// One layer line of the text format, split but not resolved.
#[derive(Debug)]
struct TextLayer<'a> {
    type_name: &'a str,
    name: &'a str,
    bottoms: Vec<&'a str>,
    tops: Vec<&'a str>,
    params: String,
}

impl<'a> TextLayer<'a> {
    fn split(line: &'a str) -> CnResult<TextLayer<'a>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        ensure!(tokens.len() >= 4, "Short layer line, {} tokens", tokens.len());
        let bottom_count: usize =
            tokens[2].parse().with_context(|| format!("Invalid bottom count {:?}", tokens[2]))?;
        let top_count: usize =
            tokens[3].parse().with_context(|| format!("Invalid top count {:?}", tokens[3]))?;
        let names = &tokens[4..];
        ensure!(
            names.len() >= bottom_count + top_count,
            "Expected {} blob names, got {}",
            bottom_count + top_count,
            names.len()
        );
        Ok(TextLayer {
            type_name: tokens[0],
            name: tokens[1],
            bottoms: names[..bottom_count].to_vec(),
            tops: names[bottom_count..][..top_count].to_vec(),
            params: names[bottom_count + top_count..].join(" "),
        })
    }
}

impl Graph {
    fn create_layer(&self, type_index: i32, pd: &ParamDict) -> CnResult<Box<dyn Layer>> {
        let mut layer = self
            .registry
            .create_layer(type_index)
            .ok_or_else(|| format_err!("Layer type {} is not available", type_index))?;
        layer.load_param(pd).with_context(|| format!("Loading parameters of {}", layer.name()))?;
        Ok(layer)
    }

    fn push_node(
        &mut self,
        type_index: i32,
        name: Option<String>,
        bottoms: TVec<usize>,
        tops: TVec<usize>,
        layer: Box<dyn Layer>,
    ) {
        let id = self.nodes.len();
        for &b in &bottoms {
            self.blobs[b].consumers.push(id);
        }
        for &t in &tops {
            self.blobs[t].producer = Some(id);
        }
        let node = Node { id, type_index, name, bottoms, tops, layer };
        debug!("Loaded {}", node);
        self.nodes.push(node);
    }

    fn load_text_layer(&mut self, layer: &TextLayer, blob_count: usize) -> CnResult<()> {
        let type_index = self
            .registry
            .type_index(layer.type_name)
            .ok_or_else(|| format_err!("Unknown layer type {}", layer.type_name))?;
        let pd = ParamDict::parse_text(&layer.params)?;
        let op = self.create_layer(type_index, &pd)?;

        let mut unseen: Vec<&str> = vec![];
        for name in &layer.bottoms {
            if !self.blobs.iter().any(|b| b.name.as_deref() == Some(*name)) && !unseen.contains(name) {
                unseen.push(*name);
            }
        }
        let needed = self.blobs.len() + unseen.len() + layer.tops.len();
        ensure!(needed <= blob_count, "Blob table overflow: {} blobs needed, {} declared", needed, blob_count);

        let mut bottoms = TVec::new();
        for name in &layer.bottoms {
            let ix = match self.blobs.iter().position(|b| b.name.as_deref() == Some(*name)) {
                Some(ix) => ix,
                None => {
                    self.blobs.push(Blob { name: Some(name.to_string()), ..Blob::default() });
                    self.blobs.len() - 1
                }
            };
            bottoms.push(ix);
        }
        let mut tops = TVec::new();
        for name in &layer.tops {
            self.blobs.push(Blob { name: Some(name.to_string()), ..Blob::default() });
            tops.push(self.blobs.len() - 1);
        }
        self.push_node(type_index, Some(layer.name.to_string()), bottoms, tops, op);
        Ok(())
    }

    /// Load the text parameter format: a `layer_count blob_count` header,
    /// then one layer per line.
    pub fn load_param_text(&mut self, read: impl BufRead) -> CnResult<()> {
        self.clear();
        let mut lines = read.lines().enumerate();
        let (layer_count, blob_count) = loop {
            let Some((_, line)) = lines.next() else { bail!("Missing layer and blob counts") };
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let counts: Vec<usize> = line
                .split_whitespace()
                .map(|t| t.parse::<usize>())
                .collect::<Result<_, _>>()
                .with_context(|| format!("Invalid header {line:?}"))?;
            ensure!(counts.len() == 2, "Invalid header {:?}", line);
            break (counts[0], counts[1]);
        };
        let mut failures = vec![];
        for (ix, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let layer = match TextLayer::split(&line) {
                Ok(layer) => layer,
                Err(e) => {
                    warn!("Skipping line {}: {}", ix + 1, e);
                    continue;
                }
            };
            if let Err(e) = self.load_text_layer(&layer, blob_count) {
                warn!("Skipping layer {} at line {}: {:?}", layer.name, ix + 1, e);
                failures.push(format!("line {} ({}): {:#}", ix + 1, layer.name, e));
            }
        }
        if self.nodes.len() != layer_count && failures.is_empty() {
            warn!("Header announced {} layers, loaded {}", layer_count, self.nodes.len());
        }
        if !failures.is_empty() {
            bail!("Failed to load {} layer(s):\n{}", failures.len(), failures.join("\n"));
        }
        Ok(())
    }

    pub fn load_param_path(&mut self, path: impl AsRef<Path>) -> CnResult<()> {
        let path = path.as_ref();
        let file = fs_err::File::open(path)?;
        self.load_param_text(BufReader::new(file)).with_context(|| format!("Loading {path:?}"))
    }

    fn load_bin_layer(
        &mut self,
        type_index: i32,
        bottoms: TVec<usize>,
        tops: TVec<usize>,
        pd: &ParamDict,
        blob_count: usize,
    ) -> CnResult<()> {
        for &b in bottoms.iter().chain(tops.iter()) {
            ensure!(b < blob_count, "Blob index {} out of range ({} blobs)", b, blob_count);
        }
        for &t in &tops {
            if let Some(p) = self.blobs.get(t).and_then(|b| b.producer) {
                bail!("Blob {} is already produced by layer #{}", t, p);
            }
        }
        let op = self.create_layer(type_index, pd)?;
        if let Some(&last) = bottoms.iter().chain(tops.iter()).max() {
            if last >= self.blobs.len() {
                self.blobs.resize(last + 1, Blob::default());
            }
        }
        self.push_node(type_index, None, bottoms, tops, op);
        Ok(())
    }

    /// Load the binary parameter format: little-endian 32-bit words, no
    /// names.
    ///
    /// The header counts are bounds, not sizes: like the text loader, the
    /// blob table only grows up to the highest index a layer references.
    pub fn load_param_bin(&mut self, mut read: impl Read) -> CnResult<()> {
        self.clear();
        let layer_count = read_count(&mut read, "layer count", i32::MAX)?;
        let blob_count = read_count(&mut read, "blob count", i32::MAX)?;
        let mut failures = vec![];
        for ix in 0..layer_count {
            let type_index = read.read_i32::<LE>().with_context(|| format!("Reading layer {ix}"))?;
            let bottom_count = read_count(&mut read, "bottom count", MAX_LAYER_ARITY)?;
            let top_count = read_count(&mut read, "top count", MAX_LAYER_ARITY)?;
            let mut slots = TVec::<usize>::new();
            for _ in 0..bottom_count + top_count {
                // negative indices are caught as out of range below
                slots.push(read.read_i32::<LE>()? as u32 as usize);
            }
            let tops: TVec<usize> = slots.drain(bottom_count..).collect();
            let pd = ParamDict::read_bin(&mut read)
                .with_context(|| format!("Reading parameters of layer {ix}"))?;
            if let Err(e) = self.load_bin_layer(type_index, slots, tops, &pd, blob_count) {
                warn!("Skipping layer {} (type {}): {:?}", ix, type_index, e);
                failures.push(format!("layer {ix} (type {type_index}): {e:#}"));
            }
        }
        if !failures.is_empty() {
            bail!("Failed to load {} layer(s):\n{}", failures.len(), failures.join("\n"));
        }
        Ok(())
    }

    pub fn load_param_bin_path(&mut self, path: impl AsRef<Path>) -> CnResult<()> {
        let path = path.as_ref();
        let file = fs_err::File::open(path)?;
        self.load_param_bin(BufReader::new(file)).with_context(|| format!("Loading {path:?}"))
    }

    /// Load the binary parameter format from memory, returning the number
    /// of bytes consumed.
    pub fn load_param_mem(&mut self, mem: &[u8]) -> CnResult<usize> {
        check_aligned(mem)?;
        let mut cursor = Cursor::new(mem);
        self.load_param_bin(&mut cursor)?;
        Ok(cursor.position() as usize)
    }

    pub fn load_param_bin_mmap(&mut self, path: impl AsRef<Path>) -> CnResult<usize> {
        let path = path.as_ref();
        let file = fs_err::File::open(path)?;
        // SAFETY: the mapping is only read while this call runs.
        let mmap = unsafe { memmap2::Mmap::map(file.file())? };
        self.load_param_mem(&mmap).with_context(|| format!("Loading {path:?}"))
    }

    /// Feed the weights of every layer, in declaration order.
    pub fn load_model_from(&mut self, mb: &mut dyn ModelBin) -> CnResult<()> {
        for node in &mut self.nodes {
            if let Err(e) = node.layer.load_model(mb) {
                error!("Failed to load weights of {}", node);
                return Err(e).with_context(|| format!("Loading weights of {node}"));
            }
        }
        Ok(())
    }

    pub fn load_model(&mut self, read: impl Read) -> CnResult<()> {
        self.load_model_from(&mut StreamModelBin::new(read))
    }

    pub fn load_model_path(&mut self, path: impl AsRef<Path>) -> CnResult<()> {
        let path = path.as_ref();
        let file = fs_err::File::open(path)?;
        self.load_model(BufReader::new(file)).with_context(|| format!("Loading {path:?}"))
    }

    /// Load weights from memory, returning the number of bytes consumed.
    pub fn load_model_mem(&mut self, mem: &[u8]) -> CnResult<usize> {
        check_aligned(mem)?;
        let mut cursor = Cursor::new(mem);
        self.load_model(&mut cursor)?;
        Ok(cursor.position() as usize)
    }

    pub fn load_model_mmap(&mut self, path: impl AsRef<Path>) -> CnResult<usize> {
        let path = path.as_ref();
        let file = fs_err::File::open(path)?;
        // SAFETY: the mapping is only read while this call runs.
        let mmap = unsafe { memmap2::Mmap::map(file.file())? };
        self.load_model_mem(&mmap).with_context(|| format!("Loading {path:?}"))
    }
}
