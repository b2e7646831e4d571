/*!
    JSON description of a processing graph.

    ```json
    {
        "timing": true,
        "steps": [
            { "plugin": "grayscale" },
            { "name": "binarize", "plugin": "threshold", "options": { "threshold": 90 } },
            { "plugin": "video_writer", "options": { "folder": "rec", "fragment_seconds": 60 } }
        ]
    }
    ```

    Option values are converted loosely (every integer becomes `u32` or
    `i32`) and the plugin's property table coerces them to the exact type.
*/

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Map;

use vidcore::property::{Point, Range, Size};
use vidcore::{Configuration, PluginRegistry, ProcessingGraph, ProcessingStep, Value};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphFile {
    /// Collect per-step timing.
    #[serde(default)]
    pub timing: bool,
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    /// Defaults to the plugin id.
    pub name: Option<String>,
    pub plugin: String,
    #[serde(default)]
    pub options: Map<String, serde_json::Value>,
}

impl GraphFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read graph file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid graph file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /**
        Build the graph and create every plugin, so bad options are reported
        before any source starts.
    */
    pub fn build(&self, name: &str, registry: Arc<PluginRegistry>) -> Result<ProcessingGraph> {
        let mut graph = ProcessingGraph::new(name, registry);
        graph.set_timing_enabled(self.timing);

        for spec in &self.steps {
            let step_name = spec.name.clone().unwrap_or_else(|| spec.plugin.clone());
            let mut configuration = Configuration::new();
            for (option, value) in &spec.options {
                let value = to_value(value)
                    .with_context(|| format!("step '{step_name}': option '{option}'"))?;
                configuration.insert(option.as_str(), value);
            }

            let step = ProcessingStep::new(&step_name, &spec.plugin).with_configuration(configuration);
            graph
                .add_step(step)
                .with_context(|| format!("step '{step_name}'"))?;
        }

        graph.instantiate().context("failed to configure graph")?;
        Ok(graph)
    }
}

fn to_value(json: &serde_json::Value) -> Result<Value> {
    use serde_json::Value as Json;

    Ok(match json {
        Json::Bool(flag) => Value::Bool(*flag),
        Json::String(text) => Value::String(text.clone()),
        Json::Number(number) => {
            if let Some(value) = number.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Value::U32(value)
            } else if let Some(value) = number.as_i64().and_then(|n| i32::try_from(n).ok()) {
                Value::I32(value)
            } else if let Some(value) = number.as_f64() {
                Value::F64(value)
            } else {
                bail!("number {number} is out of range");
            }
        }
        Json::Array(items) => Value::Array(items.iter().map(to_value).collect::<Result<_>>()?),
        Json::Object(fields) => object_value(fields)?,
        Json::Null => bail!("null is not a property value"),
    })
}

/// Objects stand for the structured property types.
fn object_value(fields: &Map<String, serde_json::Value>) -> Result<Value> {
    let number = |key: &str| fields.get(key).and_then(serde_json::Value::as_f64);
    let mut keys: Vec<&str> = fields.keys().map(String::as_str).collect();
    keys.sort_unstable();

    match keys.as_slice() {
        ["height", "width"] => Ok(Value::Size(Size {
            width: integer(fields, "width")?,
            height: integer(fields, "height")?,
        })),
        ["x", "y"] => Ok(Value::Point(Point {
            x: integer(fields, "x")?,
            y: integer(fields, "y")?,
        })),
        ["max", "min"] => match (number("min"), number("max")) {
            (Some(min), Some(max)) => Ok(Value::Range(Range { min, max })),
            _ => bail!("range bounds must be numbers"),
        },
        _ => bail!("expected {{width, height}}, {{x, y}} or {{min, max}}, got {keys:?}"),
    }
}

fn integer<T: TryFrom<i64>>(fields: &Map<String, serde_json::Value>, key: &str) -> Result<T> {
    fields
        .get(key)
        .and_then(serde_json::Value::as_i64)
        .and_then(|n| T::try_from(n).ok())
        .with_context(|| format!("'{key}' must be an integer in range"))
}
