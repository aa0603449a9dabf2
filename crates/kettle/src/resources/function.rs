//! Functions
//!
//! An output component recomputed on every `process()` from resolved input
//! components by a Rust closure. Built-in closures are selectable from the
//! device config through [`FunctionOp`].

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::warn;

use kettle_runtime::{Bundle, Component, ComponentFactory};
use kettle_types::{ComponentConfig, Value};

use super::{NamedLink, SoftResource, retarget};
use crate::binder::{BinderError, ResourceKind};

/// Closure computing an output from input values, `None` for no output
pub type FunctionFn = Box<dyn Fn(&[f64]) -> Option<f64> + Send>;

/// Built-in functions available from config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionOp {
    Sum,
    Mean,
    Min,
    Max,
    /// First input minus the rest
    Difference,
}

impl FunctionOp {
    pub fn apply(&self, inputs: &[f64]) -> Option<f64> {
        let (first, rest) = inputs.split_first()?;
        Some(match self {
            FunctionOp::Sum => inputs.iter().sum(),
            FunctionOp::Mean => inputs.iter().sum::<f64>() / inputs.len() as f64,
            FunctionOp::Min => rest.iter().fold(*first, |a, b| a.min(*b)),
            FunctionOp::Max => rest.iter().fold(*first, |a, b| a.max(*b)),
            FunctionOp::Difference => rest.iter().fold(*first, |a, b| a - b),
        })
    }

    pub fn into_fn(self) -> FunctionFn {
        Box::new(move |inputs| self.apply(inputs))
    }
}

pub struct Function {
    id: String,
    output: Component,
    inputs: Vec<String>,
    bundle: Bundle,
    func: FunctionFn,
    target: NamedLink,
}

impl Function {
    /// Create the output component and require every input
    pub fn new(
        factory: &ComponentFactory,
        bundle: Bundle,
        id: &str,
        inputs: Vec<String>,
        func: FunctionFn,
    ) -> Result<Self, BinderError> {
        for input in &inputs {
            bundle.require(input)?;
        }
        let output = factory.create(
            ComponentConfig::number(id)
                .with_group(id)
                .with_class("function")
                .read_only(true),
        )?;
        let target = NamedLink::new(factory, bundle.clone(), id, "_target")?;
        Ok(Self {
            id: id.to_string(),
            output,
            inputs,
            bundle,
            func,
            target,
        })
    }

    pub fn output(&self) -> &Component {
        &self.output
    }

    /// Input values, or `None` while any input is unresolved or not a number
    fn input_values(&self) -> Option<Vec<f64>> {
        self.inputs
            .iter()
            .map(|input| self.bundle.get(input).and_then(|c| c.read().as_f64()))
            .collect()
    }
}

impl SoftResource for Function {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Function
    }

    fn attach(&mut self, name: &str) -> Result<(), BinderError> {
        self.target.set_name(name);
        if self.target.refresh() {
            retarget(&self.output, self.target.get());
        }
        Ok(())
    }

    fn detach(&mut self) -> Result<(), BinderError> {
        self.target.set_name("");
        if self.target.refresh() {
            retarget(&self.output, None);
        }
        Ok(())
    }

    fn assignment(&self) -> Option<String> {
        Some(self.target.name()).filter(|n| !n.is_empty())
    }

    fn process(&mut self, _now: Instant) {
        if self.target.refresh() {
            retarget(&self.output, self.target.get());
        }

        let Some(values) = self.input_values() else {
            return;
        };
        let Some(result) = (self.func)(&values).filter(|v| v.is_finite()) else {
            return;
        };
        if self.output.read() == Value::Number(result) {
            return;
        }
        if let Err(e) = self.output.set(result) {
            warn!(function = %self.id, error = %e, "Output rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::resources::tests::runtime;

    #[test]
    fn test_ops() {
        let values = [6.0, 2.0, 1.0];
        assert_eq!(FunctionOp::Sum.apply(&values), Some(9.0));
        assert_eq!(FunctionOp::Mean.apply(&values), Some(3.0));
        assert_eq!(FunctionOp::Min.apply(&values), Some(1.0));
        assert_eq!(FunctionOp::Max.apply(&values), Some(6.0));
        assert_eq!(FunctionOp::Difference.apply(&values), Some(3.0));
        assert_eq!(FunctionOp::Sum.apply(&[]), None);
    }

    #[test]
    fn test_function_waits_for_inputs() {
        let (runtime, factory, bundle) = runtime();
        let registry = runtime.registry();
        let head = registry
            .create_component(ComponentConfig::number("head_temp").with_value(78.0))
            .unwrap();

        let mut spread = Function::new(
            &factory,
            bundle.clone(),
            "spread",
            vec!["pot_temp".into(), "head_temp".into()],
            Box::new(|v| Some(v[0] - v[1])),
        )
        .unwrap();

        let now = Instant::now();
        spread.process(now);
        assert_eq!(spread.output().read(), Value::Unset);

        registry
            .create_component(ComponentConfig::number("pot_temp").with_value(92.0))
            .unwrap();
        bundle.poll();
        spread.process(now);
        assert_eq!(spread.output().read(), Value::Number(14.0));

        head.set(80.0).unwrap();
        spread.process(now);
        assert_eq!(spread.output().read(), Value::Number(12.0));
    }

    #[test]
    fn test_function_mirrors_onto_target() {
        let (runtime, factory, bundle) = runtime();
        let registry = runtime.registry();
        registry
            .create_component(ComponentConfig::number("a").with_value(2.0))
            .unwrap();
        let display = registry.create_component(ComponentConfig::number("display")).unwrap();

        let mut double = Function::new(
            &factory,
            bundle,
            "double",
            vec!["a".into()],
            Box::new(|v| Some(v[0] * 2.0)),
        )
        .unwrap();
        double.attach("display").unwrap();
        double.process(Instant::now());
        assert_eq!(display.read(), Value::Number(4.0));
        assert_eq!(double.assignment().as_deref(), Some("display"));
    }
}
