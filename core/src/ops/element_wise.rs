//! Single input, element-wise layers. All of them run in place.
use crate::internal::*;

macro_rules! element_wise {
    ($Op:ident $({ $($var: ident = $id: expr, $default: expr);* $(;)? })?, $f: expr) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $Op {
            $( $(pub $var: f32),* )?
        }

        impl Default for $Op {
            fn default() -> $Op {
                $Op { $( $($var: $default),* )? }
            }
        }

        impl Layer for $Op {
            fn name(&self) -> Cow<str> {
                stringify!($Op).into()
            }

            fn info(&self) -> Vec<String> {
                vec![$( $(format!("{}={}", stringify!($var), self.$var)),* )?]
            }

            #[allow(unused_variables)]
            fn load_param(&mut self, pd: &ParamDict) -> CnResult<()> {
                $( $(self.$var = pd.get_f32($id, $default)?;)* )?
                Ok(())
            }

            fn one_blob_only(&self) -> bool {
                true
            }

            fn support_inplace(&self) -> bool {
                true
            }

            fn forward_inplace_one(&self, tensor: &mut Tensor) -> CnResult<()> {
                let f: fn(&Self, &mut [f32]) = $f;
                f(self, tensor.as_slice_mut());
                Ok(())
            }
        }
    };
}

element_wise!(AbsVal, |_, xs| xs.iter_mut().for_each(|x| *x = x.abs()));

element_wise!(ReLU { slope = 0, 0.0 }, |op, xs| {
    if op.slope == 0.0 {
        xs.iter_mut().for_each(|x| *x = x.max(0.0))
    } else {
        xs.iter_mut().filter(|x| **x < 0.0).for_each(|x| *x *= op.slope)
    }
});

// Inference time dropout only rescales.
element_wise!(Dropout { scale = 0, 1.0 }, |op, xs| {
    if op.scale != 1.0 {
        xs.iter_mut().for_each(|x| *x *= op.scale)
    }
});
