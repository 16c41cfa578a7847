//! Plugin de ejemplo: agrega un sufijo a cada valor de una variable.
//!
//! Sirve como plantilla mínima de un plugin completo: declara un stream,
//! transforma el TSV del merge service y escribe los tres resultados
//! conocidos (`output-data`, `output-meta`, `output-stats`).

use std::io::{BufRead, BufWriter, Write};

use compute_core::workspace::OUTPUT_DATA;
use compute_core::{JobRequest, MetadataSupplier, Plugin, PluginError, PluginExecutionContext, QueueLane, StreamSpec,
                   ValidationError};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::variables::VariableSpec;

const INPUT_DATA: &str = "example-input";
const COMPUTED_COLUMN_SUFFIX: &str = "WithSuffix";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleConfig {
    pub input_variable: VariableSpec,
    #[serde(default)]
    pub value_suffix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleStats {
    pub num_empty_values: u64,
}

pub struct ExamplePlugin;

impl Plugin for ExamplePlugin {
    type Config = ExampleConfig;

    const URL_SEGMENT: &'static str = "example";
    const DISPLAY_NAME: &'static str = "Example Plugin";
    const DESCRIPTION: &'static str = "Appends a suffix to every value of the selected variable";
    const QUEUE_LANE: QueueLane = QueueLane::Fast;

    fn validate(config: &ExampleConfig,
                _request: &JobRequest,
                metadata: MetadataSupplier<'_>)
                -> Result<(), ValidationError> {
        let input = &config.input_variable;
        info!("checking var {}", input.dot_notation());

        let metadata = metadata()?;
        metadata.entity(&input.entity_id)
                .ok_or_else(|| ValidationError::new(format!("Invalid entity ID : {}", input.entity_id)))?;
        metadata.variable(&input.entity_id, &input.variable_id)
                .ok_or_else(|| ValidationError::new("Invalid variable spec for output entity"))?;

        match config.value_suffix.as_deref() {
            Some(suffix) if !suffix.contains('\t') => Ok(()),
            _ => Err(ValidationError::new("valueSuffix is required and cannot contain tabs")),
        }
    }

    fn stream_specs(config: &ExampleConfig) -> Vec<StreamSpec> {
        vec![StreamSpec::new(INPUT_DATA, config.input_variable.entity_id.clone())
                 .with_vars([config.input_variable.to_value()])]
    }

    fn execute(ctx: &PluginExecutionContext, config: &ExampleConfig) -> Result<(), PluginError> {
        let workspace = ctx.workspace();
        let suffix = config.value_suffix.as_deref().unwrap_or_default();

        let mut lines = workspace.open_read(INPUT_DATA)?.lines();
        let header = lines.next()
                          .transpose()?
                          .ok_or_else(|| PluginError::msg(format!("stream '{}' is empty", INPUT_DATA)))?;

        let mut out = BufWriter::new(workspace.touch(OUTPUT_DATA)?);
        writeln!(out, "{}", convert_merge_header(&header))?;
        let mut stats = ExampleStats { num_empty_values: 0 };
        for line in lines {
            let mut line = line?;
            // Un tab final indica que el registro no tiene valor.
            if line.ends_with('\t') {
                stats.num_empty_values += 1;
            } else {
                line.push_str(suffix);
            }
            writeln!(out, "{}", line)?;
        }
        out.flush()?;

        let computed = VariableSpec::new(config.input_variable.entity_id.clone(),
                                         format!("{}{}", config.input_variable.variable_id, COMPUTED_COLUMN_SUFFIX));
        workspace.write_meta_result(&computed_variable_metadata(&computed))?;
        workspace.write_stats_result(&stats)?;
        info!("{} wrote {} rows with empty values", ctx.log_tag(), stats.num_empty_values);
        Ok(())
    }
}

/// Las cabeceras del merge service vienen en notación `entidad.variable`; se
/// conserva sólo la variable. El sufijo final renombra la última columna,
/// que es la variable calculada.
fn convert_merge_header(header: &str) -> String {
    let mut converted = header.split('\t')
                              .map(|column| column.split_once('.').map_or(column, |(_, var)| var))
                              .collect::<Vec<_>>()
                              .join("\t");
    converted.push_str(COMPUTED_COLUMN_SUFFIX);
    converted
}

fn computed_variable_metadata(spec: &VariableSpec) -> Value {
    json!({
        "variables": [{
            "variableSpec": spec.to_value(),
            "dataType": "STRING",
            "dataShape": "CONTINUOUS",
            "variableClass": "computed",
            "displayName": "Example Computed Variable",
            "imputeZero": false,
            "isCollection": false,
            "plotReference": "xAxis"
        }]
    })
}
