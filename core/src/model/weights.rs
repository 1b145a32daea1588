//! Weight streams.
//!
//! Layers pull their weights in declaration order through `ModelBin`. Each
//! `WeightKind::Auto` record starts with a 32-bit tag telling the storage
//! type of the values that follow.
use std::io::Read;

use byteorder::{ByteOrder, ReadBytesExt, LE};
use half::f16;

use crate::internal::*;

/// Plain little-endian f32 values follow.
pub const TAG_F32: u32 = 0;
/// IEEE half floats follow, padded to a multiple of 4 bytes.
pub const TAG_F16: u32 = 0x01306B47;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WeightKind {
    /// Tagged record: f32 or f16 values.
    Auto,
    /// Untagged f32 values, as used for biases.
    Raw,
}

pub trait ModelBin {
    /// Read `len` weights, converted to f32.
    fn load(&mut self, len: usize, kind: WeightKind) -> CnResult<Vec<f32>>;
}

/// `ModelBin` over any byte stream.
#[derive(Debug, new)]
pub struct StreamModelBin<R: Read> {
    reader: R,
}

impl<R: Read> StreamModelBin<R> {
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read exactly `bytes` bytes. The buffer grows with the data actually
    /// read, never with the announced size.
    fn read_bytes(&mut self, bytes: usize) -> CnResult<Vec<u8>> {
        let mut buf = vec![];
        (&mut self.reader).take(bytes as u64).read_to_end(&mut buf)?;
        ensure!(buf.len() == bytes, "Unexpected end of weights, {} of {} bytes read", buf.len(), bytes);
        Ok(buf)
    }

    fn read_f32s(&mut self, len: usize) -> CnResult<Vec<f32>> {
        let bytes = len.checked_mul(4).ok_or_else(|| format_err!("Weight count {} overflows", len))?;
        let buf = self.read_bytes(bytes)?;
        let mut values = vec![0f32; len];
        LE::read_f32_into(&buf, &mut values);
        Ok(values)
    }

    fn read_f16s(&mut self, len: usize) -> CnResult<Vec<f32>> {
        let padded = len.checked_add(len % 2).and_then(|l| l.checked_mul(2));
        let bytes = padded.ok_or_else(|| format_err!("Weight count {} overflows", len))?;
        let buf = self.read_bytes(bytes)?;
        Ok(buf.chunks_exact(2).take(len).map(|b| f16::from_bits(LE::read_u16(b)).to_f32()).collect())
    }
}

impl<R: Read> ModelBin for StreamModelBin<R> {
    fn load(&mut self, len: usize, kind: WeightKind) -> CnResult<Vec<f32>> {
        let values = match kind {
            WeightKind::Raw => self.read_f32s(len),
            WeightKind::Auto => match self.reader.read_u32::<LE>()? {
                TAG_F32 => self.read_f32s(len),
                TAG_F16 => self.read_f16s(len),
                tag => bail!("Unsupported weight tag {:#010x}", tag),
            },
        };
        values.with_context(|| format!("Reading {len} weights ({kind:?})"))
    }
}

/// Helpers to produce weight records, mostly useful to build test models.
pub mod write {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    pub fn f32_record<W: Write>(w: &mut W, values: &[f32]) -> CnResult<()> {
        w.write_u32::<LE>(TAG_F32)?;
        raw_record(w, values)
    }

    pub fn f16_record<W: Write>(w: &mut W, values: &[f32]) -> CnResult<()> {
        w.write_u32::<LE>(TAG_F16)?;
        for v in values {
            w.write_u16::<LE>(f16::from_f32(*v).to_bits())?;
        }
        if values.len() % 2 == 1 {
            w.write_u16::<LE>(0)?;
        }
        Ok(())
    }

    pub fn raw_record<W: Write>(w: &mut W, values: &[f32]) -> CnResult<()> {
        for v in values {
            w.write_f32::<LE>(*v)?;
        }
        Ok(())
    }
}
