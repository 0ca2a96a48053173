//! Linear "model" over integer inputs.

use serde_json::{json, Map, Value};

use crate::plugin::{PluginClass, PluginModule, Worker, WorkerContext, WorkerError};

fn default_config() -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("WEIGHT".into(), json!(0));
    config.insert("BIAS".into(), json!(0));
    config
}

pub fn module() -> PluginModule {
    PluginModule {
        name: "dummy_model_b",
        source: include_str!("dummy_model_b.rs"),
        default_config: Some(default_config()),
        classes: vec![PluginClass {
            name: "DummyModelBWorker",
            factory: create,
        }],
    }
}

fn create(ctx: WorkerContext) -> Box<dyn Worker> {
    Box::new(DummyModelBWorker { ctx })
}

pub struct DummyModelBWorker {
    ctx: WorkerContext,
}

impl Worker for DummyModelBWorker {
    fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    fn pre_process(&mut self, inputs: &Map<String, Value>) -> Result<Value, WorkerError> {
        inputs
            .get("INPUT_VALUE")
            .cloned()
            .ok_or_else(|| WorkerError::BadInput("INPUT_VALUE should be defined in inputs".into()))
    }

    fn predict(&mut self, prepared: Value) -> Result<Value, WorkerError> {
        self.ctx.notify(format!(
            "Predicting on usr_input: {} using {}",
            prepared,
            Value::Object(self.ctx.config_data().clone())
        ));

        let x = super::as_number(&prepared)
            .ok_or_else(|| WorkerError::Predict(format!("'{}' is not a number", prepared)))?;
        let weight = self.ctx.config_f64("WEIGHT");
        let bias = self.ctx.config_f64("BIAS");
        Ok(Value::String(format!(
            "{}*{} + {} = {} PREDICTED",
            prepared,
            weight,
            bias,
            x.trunc() * weight + bias
        )))
    }

    fn post_process(&mut self, prediction: Value) -> Result<Value, WorkerError> {
        Ok(json!({ "dummy_model_predict": prediction }))
    }
}
