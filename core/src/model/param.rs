//! Layer parameters, decoded from any of the parameter encodings.
//!
//! Text: `id=value` tokens, arrays as `-(23300+id)=n,v1,...,vn`.
//!
//! Binary: little-endian 32-bit words. An `id` word followed by one value
//! word, or for arrays `-(23300+id)`, a count and the values. The dictionary
//! ends with `-233`. Binary values carry no type: the layer decides whether
//! it reads a word as an integer or a float.
use std::collections::BTreeMap;
use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use nom::branch::alt;
use nom::character::complete::{char, digit0, digit1, multispace0, one_of};
use nom::combinator::{all_consuming, map_opt, map_res, opt, recognize};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, pair, separated_pair, terminated, tuple};
use nom::IResult;

use crate::internal::*;

pub const ARRAY_TAG: i32 = -23300;
pub const END_TAG: i32 = -233;

/// Ids are small integers, but they are untrusted input.
pub const MAX_PARAM_ID: i32 = 1 << 16;

/// One 32-bit parameter value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Word {
    Int(i32),
    Float(f32),
    /// Raw bits from a binary encoding.
    Raw(u32),
}

impl Word {
    pub fn as_i32(self) -> i32 {
        match self {
            Word::Int(i) => i,
            Word::Float(f) => f as i32,
            Word::Raw(bits) => bits as i32,
        }
    }

    pub fn as_f32(self) -> f32 {
        match self {
            Word::Int(i) => i as f32,
            Word::Float(f) => f,
            Word::Raw(bits) => f32::from_bits(bits),
        }
    }

    pub fn to_bits(self) -> u32 {
        match self {
            Word::Int(i) => i as u32,
            Word::Float(f) => f.to_bits(),
            Word::Raw(bits) => bits,
        }
    }
}

impl From<i32> for Word {
    fn from(i: i32) -> Word {
        Word::Int(i)
    }
}

impl From<f32> for Word {
    fn from(f: f32) -> Word {
        Word::Float(f)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Scalar(Word),
    Array(Vec<Word>),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamDict {
    values: BTreeMap<i32, ParamValue>,
}

impl ParamDict {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn contains(&self, id: i32) -> bool {
        self.values.contains_key(&id)
    }

    pub fn set(&mut self, id: i32, value: impl Into<Word>) -> &mut Self {
        self.values.insert(id, ParamValue::Scalar(value.into()));
        self
    }

    pub fn set_array<W: Into<Word>>(
        &mut self,
        id: i32,
        values: impl IntoIterator<Item = W>,
    ) -> &mut Self {
        self.values.insert(id, ParamValue::Array(values.into_iter().map(|w| w.into()).collect()));
        self
    }

    fn scalar(&self, id: i32) -> CnResult<Option<Word>> {
        match self.values.get(&id) {
            None => Ok(None),
            Some(ParamValue::Scalar(w)) => Ok(Some(*w)),
            Some(ParamValue::Array(_)) => bail!("Parameter {} is an array, expected a scalar", id),
        }
    }

    fn array(&self, id: i32) -> CnResult<Option<&[Word]>> {
        match self.values.get(&id) {
            None => Ok(None),
            Some(ParamValue::Array(a)) => Ok(Some(a)),
            Some(ParamValue::Scalar(_)) => bail!("Parameter {} is a scalar, expected an array", id),
        }
    }

    pub fn get_i32(&self, id: i32, default: i32) -> CnResult<i32> {
        Ok(self.scalar(id)?.map(|w| w.as_i32()).unwrap_or(default))
    }

    pub fn get_f32(&self, id: i32, default: f32) -> CnResult<f32> {
        Ok(self.scalar(id)?.map(|w| w.as_f32()).unwrap_or(default))
    }

    pub fn get_usize(&self, id: i32, default: usize) -> CnResult<usize> {
        match self.scalar(id)? {
            None => Ok(default),
            Some(w) => {
                let i = w.as_i32();
                usize::try_from(i).map_err(|_| format_err!("Parameter {} must be positive, got {}", id, i))
            }
        }
    }

    pub fn get_bool(&self, id: i32, default: bool) -> CnResult<bool> {
        Ok(self.scalar(id)?.map(|w| w.as_i32() != 0).unwrap_or(default))
    }

    pub fn get_f32_array(&self, id: i32) -> CnResult<Option<Vec<f32>>> {
        Ok(self.array(id)?.map(|a| a.iter().map(|w| w.as_f32()).collect()))
    }

    pub fn get_i32_array(&self, id: i32) -> CnResult<Option<Vec<i32>>> {
        Ok(self.array(id)?.map(|a| a.iter().map(|w| w.as_i32()).collect()))
    }

    /// Parse the parameter tokens of one text line.
    pub fn parse_text(text: &str) -> CnResult<ParamDict> {
        let (_, entries) =
            all_consuming(delimited(multispace0, many0(terminated(entry, multispace0)), multispace0))(
                text,
            )
            .map_err(|e| format_err!("Fail to parse parameters {:?}: {:?}", text, e))?;
        let mut pd = ParamDict::default();
        for (key, words) in entries {
            if key <= ARRAY_TAG {
                let id = ARRAY_TAG - key;
                ensure!(id < MAX_PARAM_ID, "Parameter id {} out of range", id);
                let (count, values) =
                    words.split_first().ok_or_else(|| format_err!("Empty array for id {}", id))?;
                ensure!(
                    count.as_i32() as usize == values.len() && count.as_i32() >= 0,
                    "Array parameter {} announces {:?} values, got {}",
                    id,
                    count,
                    values.len()
                );
                pd.values.insert(id, ParamValue::Array(values.to_vec()));
            } else {
                ensure!((0..MAX_PARAM_ID).contains(&key), "Parameter id {} out of range", key);
                ensure!(words.len() == 1, "Parameter {} expects a single value", key);
                pd.values.insert(key, ParamValue::Scalar(words[0]));
            }
        }
        Ok(pd)
    }

    /// Read a binary dictionary, up to and including its end tag.
    pub fn read_bin<R: Read + ?Sized>(r: &mut R) -> CnResult<ParamDict> {
        let mut pd = ParamDict::default();
        loop {
            let key = r.read_i32::<LE>()?;
            if key == END_TAG {
                return Ok(pd);
            }
            if key <= ARRAY_TAG {
                let id = ARRAY_TAG - key;
                ensure!(id < MAX_PARAM_ID, "Parameter id {} out of range", id);
                let count = r.read_i32::<LE>()?;
                ensure!(count >= 0, "Negative array length {} for parameter {}", count, id);
                let mut words = vec![];
                for _ in 0..count {
                    words.push(Word::Raw(r.read_u32::<LE>()?));
                }
                pd.values.insert(id, ParamValue::Array(words));
            } else {
                ensure!((0..MAX_PARAM_ID).contains(&key), "Parameter id {} out of range", key);
                pd.values.insert(key, ParamValue::Scalar(Word::Raw(r.read_u32::<LE>()?)));
            }
        }
    }

    pub fn write_text(&self) -> String {
        fn word(w: &Word) -> String {
            match w {
                Word::Float(f) => format!("{f:?}"),
                other => other.as_i32().to_string(),
            }
        }
        self.values
            .iter()
            .map(|(id, v)| match v {
                ParamValue::Scalar(w) => format!("{}={}", id, word(w)),
                ParamValue::Array(a) => {
                    let mut s = format!("{}={}", ARRAY_TAG - id, a.len());
                    for w in a {
                        s.push(',');
                        s.push_str(&word(w));
                    }
                    s
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn write_bin<W: Write + ?Sized>(&self, w: &mut W) -> CnResult<()> {
        for (id, v) in &self.values {
            match v {
                ParamValue::Scalar(word) => {
                    w.write_i32::<LE>(*id)?;
                    w.write_u32::<LE>(word.to_bits())?;
                }
                ParamValue::Array(a) => {
                    w.write_i32::<LE>(ARRAY_TAG - id)?;
                    w.write_i32::<LE>(a.len() as i32)?;
                    for word in a {
                        w.write_u32::<LE>(word.to_bits())?;
                    }
                }
            }
        }
        w.write_i32::<LE>(END_TAG)?;
        Ok(())
    }
}

fn key(i: &str) -> IResult<&str, i32> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| s.parse::<i32>())(i)
}

fn number(i: &str) -> IResult<&str, Word> {
    fn exp_part(i: &str) -> IResult<&str, &str> {
        recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(i)
    }
    fn mantissa(i: &str) -> IResult<&str, &str> {
        alt((recognize(pair(digit1, opt(pair(char('.'), digit0)))), recognize(pair(char('.'), digit1))))(i)
    }
    map_opt(recognize(tuple((opt(one_of("+-")), mantissa, opt(exp_part)))), |s: &str| {
        if s.contains(|c| matches!(c, '.' | 'e' | 'E')) {
            s.parse::<f32>().ok().map(Word::Float)
        } else {
            s.parse::<i32>().ok().map(Word::Int)
        }
    })(i)
}

fn entry(i: &str) -> IResult<&str, (i32, Vec<Word>)> {
    separated_pair(key, char('='), separated_list1(char(','), number))(i)
}
