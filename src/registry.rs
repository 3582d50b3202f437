//! Static model registry. Populated once from configuration at startup and
//! immutable afterwards; shared across requests without locking.

use crate::config::Config;
use serde::Serialize;
use serde_json::{json, Value};
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// Where a model name routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingClass {
    /// Handled by the augmented generation pipeline in-process.
    Augmented,
    /// Forwarded to the upstream generation service.
    Proxied,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(skip)]
    pub routing_class: RoutingClass,
    pub family: String,
    pub parameter_size: String,
    pub size_bytes: u64,
    pub quantization: String,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    pub fn from_config(config: &Config) -> Self {
        let models = vec![
            ModelDescriptor {
                name: config.rag_model_name.clone(),
                routing_class: RoutingClass::Augmented,
                family: "rag-enhanced".to_string(),
                parameter_size: "RAG+27B".to_string(),
                size_bytes: 2_500_000_000,
                quantization: "Q4_K_M".to_string(),
            },
            ModelDescriptor {
                name: config.upstream_model_name.clone(),
                routing_class: RoutingClass::Proxied,
                family: family_of(&config.upstream_model_name),
                parameter_size: "27B".to_string(),
                size_bytes: 15_000_000_000,
                quantization: "Q4_K_M".to_string(),
            },
        ];
        Self { models }
    }

    pub fn list(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn describe(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Exact string match against the augmented entries; anything else,
    /// including names the registry has never seen, routes to the proxy so
    /// arbitrary upstream models keep working.
    pub fn classify(&self, model: &str) -> RoutingClass {
        match self.describe(model) {
            Some(descriptor) => descriptor.routing_class,
            None => RoutingClass::Proxied,
        }
    }

    /// Ollama `/api/tags` response shape.
    pub fn tags_json(&self) -> Value {
        let models: Vec<Value> = self.models.iter().map(model_entry).collect();
        json!({ "models": models })
    }

    /// Ollama `/api/ps` response shape: the tags entries with runtime fields.
    pub fn ps_json(&self) -> Value {
        let models: Vec<Value> = self
            .models
            .iter()
            .map(|m| {
                let mut entry = model_entry(m);
                let obj = entry.as_object_mut().expect("model entry is an object");
                obj.insert(
                    "expires_at".to_string(),
                    json!("2024-12-01T23:59:59.999999999Z"),
                );
                obj.insert("size_vram".to_string(), json!(2_147_483_648u64));
                entry
            })
            .collect();
        json!({ "models": models })
    }

    /// Ollama `/api/show` response shape for one model, or an error object
    /// when the name is unknown or missing.
    pub fn show_json(&self, name: Option<&str>) -> Value {
        let Some(name) = name else {
            return json!({ "error": "model name required" });
        };
        match self.describe(name) {
            Some(m) => json!({
                "modelfile": format!("FROM {}", m.name),
                "parameters": {
                    "temperature": 0.7,
                    "top_k": 40,
                    "top_p": 0.9
                },
                "template": "{{ .System }}{{ .Prompt }}",
                "details": details_json(m),
            }),
            None => json!({ "error": format!("model '{}' not found", name) }),
        }
    }
}

fn family_of(model_name: &str) -> String {
    model_name
        .split(':')
        .next()
        .unwrap_or(model_name)
        .to_string()
}

/// Deterministic synthetic digest; these models have no real blob behind them.
fn digest_of(name: &str) -> String {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    format!("sha256:{:064x}", hasher.finish())
}

fn details_json(m: &ModelDescriptor) -> Value {
    json!({
        "parent_model": "",
        "format": "gguf",
        "family": m.family,
        "families": [m.family],
        "parameter_size": m.parameter_size,
        "quantization_level": m.quantization,
    })
}

fn model_entry(m: &ModelDescriptor) -> Value {
    json!({
        "name": m.name,
        "model": m.name,
        "modified_at": "2024-12-01T00:00:00.000000000Z",
        "size": m.size_bytes,
        "digest": digest_of(&m.name),
        "details": details_json(m),
    })
}
