//! Linear "model" with a placeholder word model for non-numeric inputs.

use serde_json::{json, Map, Value};

use crate::plugin::{PluginClass, PluginModule, Worker, WorkerContext, WorkerError};

const WORKER_VERSION: &str = "1.2.1";

fn default_config() -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("WEIGHT".into(), json!(0));
    config.insert("BIAS".into(), json!(0));
    config.insert("PLACEHOLDER_MODEL".into(), json!(true));
    config
}

pub fn module() -> PluginModule {
    PluginModule {
        name: "dummy_model_a",
        source: include_str!("dummy_model_a.rs"),
        default_config: Some(default_config()),
        classes: vec![PluginClass {
            name: "DummyModelAWorker",
            factory: create,
        }],
    }
}

fn create(ctx: WorkerContext) -> Box<dyn Worker> {
    Box::new(DummyModelAWorker { ctx, model: None })
}

/// Stand-in for a word-embeddings engine.
struct PlaceholderModel;

impl PlaceholderModel {
    fn get_similar(&self, _word: &str, _lang: &str) -> String {
        "same-word-always".to_string()
    }
}

pub struct DummyModelAWorker {
    ctx: WorkerContext,
    model: Option<PlaceholderModel>,
}

impl Worker for DummyModelAWorker {
    fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    fn load(&mut self) -> Result<(), WorkerError> {
        if !self.ctx.config_bool("PLACEHOLDER_MODEL") {
            return Err(WorkerError::Load(
                "no embeddings engine bundled, set PLACEHOLDER_MODEL".to_string(),
            ));
        }
        self.ctx.notify("Using a model placeholder");
        self.model = Some(PlaceholderModel);
        Ok(())
    }

    fn pre_process(&mut self, inputs: &Map<String, Value>) -> Result<Value, WorkerError> {
        let value = inputs
            .get("INPUT_VALUE")
            .ok_or_else(|| WorkerError::BadInput("INPUT_VALUE should be defined in inputs".into()))?;
        let lang = inputs
            .get("LANGUAGE")
            .or_else(|| inputs.get("language"))
            .and_then(Value::as_str)
            .unwrap_or("ro");
        Ok(json!({ "value": value, "lang": lang }))
    }

    fn predict(&mut self, prepared: Value) -> Result<Value, WorkerError> {
        self.ctx.notify(format!(
            "Predicting on usr_input: {} using {}",
            prepared,
            Value::Object(self.ctx.config_data().clone())
        ));

        if let Some(x) = super::as_number(&prepared["value"]) {
            let weight = self.ctx.config_f64("WEIGHT");
            let bias = self.ctx.config_f64("BIAS");
            let val = x.trunc() * weight + bias;
            return Ok(Value::String(format!(
                "{}*{} + {} = {} PREDICTED",
                x, weight, bias, val
            )));
        }

        let model = self
            .model
            .as_ref()
            .ok_or_else(|| WorkerError::Predict("model not loaded".into()))?;
        let word = match &prepared["value"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let lang = prepared["lang"].as_str().unwrap_or("ro");
        Ok(Value::String(model.get_similar(&word, lang)))
    }

    fn post_process(&mut self, prediction: Value) -> Result<Value, WorkerError> {
        Ok(json!({
            "dummy_model_a_predict": prediction,
            "worker_ver": WORKER_VERSION,
        }))
    }
}
