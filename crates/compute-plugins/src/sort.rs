//! Plugin que ordena las filas de un stream con el binario `sort` del
//! sistema. La cabecera se conserva como primera línea.

use std::io::{BufRead, BufWriter, Write};

use compute_core::workspace::OUTPUT_DATA;
use compute_core::{Plugin, PluginError, PluginExecutionContext, QueueLane, StreamSpec};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::variables::VariableSpec;

const INPUT_DATA: &str = "sort-input";
const UNSORTED_ROWS: &str = "unsorted-rows";
const SORTED_ROWS: &str = "sorted-rows";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortConfig {
    pub entity_id: String,
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    #[serde(default)]
    pub reverse: bool,
}

pub struct SortPlugin;

impl Plugin for SortPlugin {
    type Config = SortConfig;

    const URL_SEGMENT: &'static str = "sort";
    const DISPLAY_NAME: &'static str = "Sort rows";
    const DESCRIPTION: &'static str = "Sorts the rows of a tabular stream with the system sort utility";
    const QUEUE_LANE: QueueLane = QueueLane::Slow;

    fn stream_specs(config: &SortConfig) -> Vec<StreamSpec> {
        vec![StreamSpec::new(INPUT_DATA, config.entity_id.clone())
                 .with_vars(config.variables.iter().map(VariableSpec::to_value))]
    }

    fn execute(ctx: &PluginExecutionContext, config: &SortConfig) -> Result<(), PluginError> {
        let workspace = ctx.workspace();

        let mut lines = workspace.open_read(INPUT_DATA)?.lines();
        let header = lines.next().transpose()?.unwrap_or_default();
        {
            let mut rows = BufWriter::new(workspace.touch(UNSORTED_ROWS)?);
            for line in lines {
                writeln!(rows, "{}", line?)?;
            }
            rows.flush()?;
        }

        let mut runner = ctx.process("sort").env("LC_ALL", "C");
        if config.reverse {
            runner = runner.arg("-r");
        }
        let runner = runner.arg(UNSORTED_ROWS).stdout_to(SORTED_ROWS);
        debug!("{} running {}", ctx.log_tag(), runner.command());
        let code = runner.run()?;
        if code != 0 {
            return Err(PluginError::ExitStatus { command: runner.command().to_string(), code });
        }

        let mut out = BufWriter::new(workspace.touch(OUTPUT_DATA)?);
        writeln!(out, "{}", header)?;
        std::io::copy(&mut workspace.open_read(SORTED_ROWS)?, &mut out)?;
        out.flush()?;
        Ok(())
    }
}
