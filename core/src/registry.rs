//! Layer factories.
//!
//! Built-in layers are addressed by a fixed enumeration. Custom layers live
//! in a separate index space, tagged by `CUSTOM_BIT`, and are owned by the
//! graph that registered them.
use std::fmt;

use crate::internal::*;
use crate::ops;

/// Tag bit of custom layer type indices.
pub const CUSTOM_BIT: i32 = 1 << 8;

/// Custom table positions stay below the tag bit.
pub const MAX_CUSTOM_LAYERS: usize = CUSTOM_BIT as usize;

pub type LayerCreator = Arc<dyn Fn() -> Box<dyn Layer> + Send + Sync>;

macro_rules! layer_types {
    ($($variant: ident = $ix: expr),* $(,)?) => {
        /// Built-in layer types. Indices are part of the binary format.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum LayerType {
            $($variant = $ix),*
        }

        impl LayerType {
            pub const ALL: &'static [LayerType] = &[$(LayerType::$variant),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(LayerType::$variant => stringify!($variant)),*
                }
            }
        }
    }
}

layer_types!(
    AbsVal = 0,
    ArgMax = 1,
    BatchNorm = 2,
    Bias = 3,
    BNLL = 4,
    Concat = 5,
    Convolution = 6,
    Crop = 7,
    Deconvolution = 8,
    Dropout = 9,
    ELU = 10,
    Eltwise = 11,
    Embed = 12,
    Exp = 13,
    Flatten = 14,
    InnerProduct = 15,
    Input = 16,
    Log = 17,
    LRN = 18,
    MemoryData = 19,
    MVN = 20,
    Pooling = 21,
    Power = 22,
    PReLU = 23,
    Proposal = 24,
    Reduction = 25,
    ReLU = 26,
    Reshape = 27,
    ROIPooling = 28,
    Scale = 29,
    Sigmoid = 30,
    Slice = 31,
    Softmax = 32,
    Split = 33,
    SPP = 34,
    TanH = 35,
    Threshold = 36,
    Tile = 37,
    RNN = 38,
    LSTM = 39,
    BinaryOp = 40,
    UnaryOp = 41,
    ConvolutionDepthWise = 42,
);

impl LayerType {
    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn from_index(ix: i32) -> Option<LayerType> {
        usize::try_from(ix).ok().and_then(|ix| Self::ALL.get(ix)).copied()
    }

    pub fn from_name(name: &str) -> Option<LayerType> {
        Self::ALL.iter().find(|t| t.name() == name).copied()
    }

    /// A fresh instance, or None for the types this build does not
    /// implement.
    pub fn create(self) -> Option<Box<dyn Layer>> {
        use LayerType::*;
        let layer: Box<dyn Layer> = match self {
            AbsVal => ops::element_wise::AbsVal::default().into(),
            Concat => ops::array::Concat::default().into(),
            Convolution => ops::cnn::Convolution::default().into(),
            Dropout => ops::element_wise::Dropout::default().into(),
            Eltwise => ops::math::Eltwise::default().into(),
            Input => ops::source::Input::default().into(),
            Pooling => ops::cnn::Pooling::default().into(),
            ReLU => ops::element_wise::ReLU::default().into(),
            Split => ops::array::Split.into(),
            _ => return None,
        };
        Some(layer)
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Default)]
struct CustomEntry {
    name: Option<String>,
    creator: Option<LayerCreator>,
}

/// Custom layer table of one graph.
#[derive(Clone, Default)]
pub struct LayerRegistry {
    custom: Vec<CustomEntry>,
}

impl fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries(self.custom.iter().enumerate().filter(|(_, e)| e.creator.is_some()).map(
                |(ix, e)| format!("{}:{}", ix as i32 | CUSTOM_BIT, e.name.as_deref().unwrap_or("?")),
            ))
            .finish()
    }
}

impl LayerRegistry {
    /// Register a custom layer under `name`, returning its type index.
    pub fn register_custom_layer(
        &mut self,
        name: &str,
        creator: impl Fn() -> Box<dyn Layer> + Send + Sync + 'static,
    ) -> CnResult<i32> {
        if let Some(builtin) = LayerType::from_name(name) {
            error!("Can not register custom layer {}: it is a built-in layer type", name);
            bail!("{} is a built-in layer type (index {})", name, builtin.index());
        }
        let ix = match self.custom_layer_index(name) {
            Some(ix) => {
                warn!("Overwriting existing custom layer {}", name);
                ix
            }
            None => {
                ensure!(self.custom.len() < MAX_CUSTOM_LAYERS, "Too many custom layers ({})", MAX_CUSTOM_LAYERS);
                self.custom.push(CustomEntry::default());
                self.custom.len() - 1
            }
        };
        self.custom[ix] = CustomEntry { name: Some(name.to_string()), creator: Some(Arc::new(creator)) };
        debug!("Registered custom layer {} as {}", name, ix as i32 | CUSTOM_BIT);
        Ok(ix as i32 | CUSTOM_BIT)
    }

    /// Register a custom layer under an explicit type index, for graphs
    /// loaded from the binary formats.
    pub fn register_custom_layer_index(
        &mut self,
        type_index: i32,
        creator: impl Fn() -> Box<dyn Layer> + Send + Sync + 'static,
    ) -> CnResult<()> {
        if type_index < 0 || type_index & CUSTOM_BIT == 0 {
            error!("Can not register custom layer at index {}: not a custom index", type_index);
            bail!("Layer index {} is not a custom index", type_index);
        }
        let ix = (type_index & !CUSTOM_BIT) as usize;
        if ix >= MAX_CUSTOM_LAYERS {
            error!("Can not register custom layer at index {}: out of range", type_index);
            bail!("Custom layer index {} is out of range (at most {} custom layers)", type_index, MAX_CUSTOM_LAYERS);
        }
        if self.custom.len() <= ix {
            self.custom.resize(ix + 1, CustomEntry::default());
        }
        if self.custom[ix].creator.is_some() {
            warn!("Overwriting existing custom layer at index {}", type_index);
        }
        self.custom[ix].creator = Some(Arc::new(creator));
        Ok(())
    }

    /// Position of a named custom layer in the custom table.
    pub fn custom_layer_index(&self, name: &str) -> Option<usize> {
        self.custom.iter().position(|e| e.name.as_deref() == Some(name))
    }

    /// Type index of a layer name, built-ins first.
    pub fn type_index(&self, name: &str) -> Option<i32> {
        LayerType::from_name(name)
            .map(|t| t.index())
            .or_else(|| self.custom_layer_index(name).map(|ix| ix as i32 | CUSTOM_BIT))
    }

    pub fn type_name(&self, type_index: i32) -> Option<Cow<'_, str>> {
        if type_index >= 0 && type_index & CUSTOM_BIT != 0 {
            let ix = (type_index & !CUSTOM_BIT) as usize;
            self.custom.get(ix).and_then(|e| e.name.as_deref()).map(Cow::Borrowed)
        } else {
            LayerType::from_index(type_index).map(|t| Cow::Borrowed(t.name()))
        }
    }

    /// A fresh layer for a built-in or custom type index.
    pub fn create_layer(&self, type_index: i32) -> Option<Box<dyn Layer>> {
        if type_index >= 0 && type_index & CUSTOM_BIT != 0 {
            let ix = (type_index & !CUSTOM_BIT) as usize;
            self.custom.get(ix).and_then(|e| e.creator.as_ref()).map(|c| c())
        } else {
            LayerType::from_index(type_index).and_then(|t| t.create())
        }
    }
}
