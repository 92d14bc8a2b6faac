//! Builds a transform chain from a pipeline config.

use datalift_types::{Column, EtlError, Sort};

use crate::config::{PipelineConfig, StageConfig};
use crate::functions::{FunctionRegistry, GeneratorMapping, ValidationMapping};
use crate::transform::rows::{ColumnPair, TransformRows};
use crate::transform::sort::TransformSort;
use crate::transform::validation::TransformValidation;
use crate::transform::BoxedTransform;

/// Wire the configured stages onto `source`, innermost first.
///
/// Mapping functions are resolved against the caller's registry; no global
/// state is consulted. A stage that requires ordered input gets a sort
/// stage inserted upstream — the sort negotiates passthrough at open time,
/// so it costs nothing when the order is already satisfied.
pub fn build_pipeline(
    config: &PipelineConfig,
    source: BoxedTransform,
    registry: &FunctionRegistry,
) -> Result<BoxedTransform, EtlError> {
    crate::config::validate_pipeline(config)?;

    let mut current = source;
    for stage in &config.stages {
        current = match stage {
            StageConfig::Sort(sort) => {
                let sort_fields = sort
                    .columns
                    .iter()
                    .map(|c| Sort {
                        column: c.column.clone(),
                        direction: c.direction,
                    })
                    .collect();
                Box::new(TransformSort::new(current, sort_fields))
            }
            StageConfig::Validation(validation) => {
                let mappings = validation
                    .mappings
                    .iter()
                    .map(|mapping| {
                        let rule = registry.build_validation(&mapping.function, &mapping.params)?;
                        let mut built = ValidationMapping::new(
                            mapping.function.clone(),
                            mapping.invalid_action,
                            mapping.columns.clone(),
                            rule,
                        );
                        if let Some(outputs) = &mapping.outputs {
                            built = built.with_output_columns(outputs.clone());
                        }
                        Ok(built)
                    })
                    .collect::<Result<Vec<_>, EtlError>>()?;
                Box::new(TransformValidation::new(
                    current,
                    mappings,
                    validation.validate_data_types,
                ))
            }
            StageConfig::Rows(rows) => {
                let group_columns: Vec<ColumnPair> = rows
                    .group
                    .iter()
                    .map(|pair| ColumnPair {
                        source: pair.source.clone(),
                        target: pair.target.clone().unwrap_or_else(|| pair.source.clone()),
                    })
                    .collect();
                let generators = rows
                    .generators
                    .iter()
                    .map(|generator| {
                        let built =
                            registry.build_generator(&generator.function, &generator.params)?;
                        Ok(GeneratorMapping {
                            name: generator.function.clone(),
                            input_columns: generator.columns.clone(),
                            output_columns: generator
                                .outputs
                                .iter()
                                .map(|output| Column::new(output.name.clone(), output.data_type))
                                .collect(),
                            generator: built,
                        })
                    })
                    .collect::<Result<Vec<_>, EtlError>>()?;

                // grouping needs ordered input; the inserted sort falls back
                // to passthrough when the upstream already complies
                if !group_columns.is_empty() {
                    let sort_fields = group_columns
                        .iter()
                        .map(|pair| Sort::ascending(pair.source.clone()))
                        .collect();
                    current = Box::new(TransformSort::new(current, sort_fields));
                }
                Box::new(TransformRows::new(
                    current,
                    group_columns,
                    generators,
                    rows.pass_through,
                ))
            }
        };
    }
    Ok(current)
}
