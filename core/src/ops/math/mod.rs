//! Layers combining several inputs position by position.
use crate::internal::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EltwiseOp {
    Prod,
    #[default]
    Sum,
    Max,
}

impl EltwiseOp {
    fn from_code(code: i32) -> CnResult<EltwiseOp> {
        Ok(match code {
            0 => EltwiseOp::Prod,
            1 => EltwiseOp::Sum,
            2 => EltwiseOp::Max,
            _ => bail!("Unknown eltwise operation {}", code),
        })
    }
}

/// Element-wise product, (weighted) sum or max of same shaped inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Eltwise {
    pub op: EltwiseOp,
    /// Per-input factors of the sum. Empty means all ones.
    pub coeffs: Vec<f32>,
}

impl Layer for Eltwise {
    fn name(&self) -> Cow<str> {
        "Eltwise".into()
    }

    fn info(&self) -> Vec<String> {
        let mut info = vec![format!("{:?}", self.op)];
        if !self.coeffs.is_empty() {
            info.push(format!("coeffs={:?}", self.coeffs));
        }
        info
    }

    fn load_param(&mut self, pd: &ParamDict) -> CnResult<()> {
        self.op = EltwiseOp::from_code(pd.get_i32(0, 1)?)?;
        self.coeffs = pd.get_f32_array(1)?.unwrap_or_default();
        Ok(())
    }

    fn forward(&self, inputs: TVec<TValue>, top_count: usize) -> CnResult<TVec<TValue>> {
        ensure!(top_count == 1, "Eltwise has one output, {} requested", top_count);
        ensure!(!inputs.is_empty(), "Eltwise needs at least one input");
        let shape = inputs[0].shape();
        if let Some(other) = inputs.iter().find(|t| t.shape() != shape) {
            bail!("Eltwise inputs shape mismatch: {:?} and {:?}", shape, other.shape());
        }
        let coeffs = match (self.op, self.coeffs.is_empty()) {
            (EltwiseOp::Sum, false) => {
                ensure!(
                    self.coeffs.len() == inputs.len(),
                    "Eltwise has {} coefficients for {} inputs",
                    self.coeffs.len(),
                    inputs.len()
                );
                Some(&*self.coeffs)
            }
            _ => None,
        };
        let mut acc: Tensor = (*inputs[0]).clone();
        if let Some(coeffs) = coeffs {
            acc.as_slice_mut().iter_mut().for_each(|x| *x *= coeffs[0]);
        }
        for (ix, input) in inputs.iter().enumerate().skip(1) {
            let pairs = acc.as_slice_mut().iter_mut().zip(input.as_slice());
            match (self.op, coeffs) {
                (EltwiseOp::Prod, _) => pairs.for_each(|(a, b)| *a *= b),
                (EltwiseOp::Sum, None) => pairs.for_each(|(a, b)| *a += b),
                (EltwiseOp::Sum, Some(coeffs)) => pairs.for_each(|(a, b)| *a += b * coeffs[ix]),
                (EltwiseOp::Max, _) => pairs.for_each(|(a, b)| *a = a.max(*b)),
            }
        }
        Ok(tvec!(acc.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> TVec<TValue> {
        tvec!(tensor1(&[1.0, -2.0]).into(), tensor1(&[3.0, 4.0]).into())
    }

    fn eltwise(pd: &ParamDict) -> Eltwise {
        let mut op = Eltwise::default();
        op.load_param(pd).unwrap();
        op
    }

    fn run(pd: &ParamDict) -> Vec<f32> {
        eltwise(pd).forward(inputs(), 1).unwrap()[0].as_slice().to_vec()
    }

    #[test]
    fn ops() {
        assert_eq!(run(&ParamDict::default()), vec![4.0, 2.0]);
        assert_eq!(run(ParamDict::default().set(0, 0)), vec![3.0, -8.0]);
        assert_eq!(run(ParamDict::default().set(0, 2)), vec![3.0, 4.0]);
        assert_eq!(run(ParamDict::default().set_array(1, [2.0f32, -1.0])), vec![-1.0, -8.0]);
    }

    #[test]
    fn checks() {
        let mut bad = ParamDict::default();
        bad.set(0, 7);
        assert!(Eltwise::default().load_param(&bad).is_err());
        let op = eltwise(ParamDict::default().set_array(1, [1.0f32]));
        assert!(op.forward(inputs(), 1).is_err());
        let mismatch = tvec!(tensor1(&[1.0]).into(), tensor1(&[1.0, 2.0]).into());
        assert!(Eltwise::default().forward(mismatch, 1).is_err());
    }
}
