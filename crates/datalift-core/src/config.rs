//! YAML pipeline configuration.

use serde::{Deserialize, Serialize};

use datalift_types::{DataType, EtlError, InvalidAction, SortDirection};

/// A declarative pipeline: an ordered list of transform stages applied to
/// a caller-supplied source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub version: String,
    pub pipeline: String,
    pub stages: Vec<StageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageConfig {
    Sort(SortStageConfig),
    Validation(ValidationStageConfig),
    Rows(RowsStageConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortStageConfig {
    pub columns: Vec<SortColumnConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortColumnConfig {
    pub column: String,
    #[serde(default = "default_direction")]
    pub direction: SortDirection,
}

fn default_direction() -> SortDirection {
    SortDirection::Ascending
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationStageConfig {
    #[serde(default = "default_true")]
    pub validate_data_types: bool,
    pub mappings: Vec<MappingConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Registry identifier of the validation function.
    pub function: String,
    /// Columns read from the source row, in rule-argument order.
    pub columns: Vec<String>,
    /// Columns a cleaner overwrites; defaults to `columns`.
    #[serde(default)]
    pub outputs: Option<Vec<String>>,
    #[serde(default = "default_action")]
    pub invalid_action: InvalidAction,
    #[serde(default)]
    pub params: serde_json::Value,
}

fn default_action() -> InvalidAction {
    InvalidAction::Reject
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowsStageConfig {
    #[serde(default)]
    pub group: Vec<GroupColumnConfig>,
    pub generators: Vec<GeneratorConfig>,
    #[serde(default)]
    pub pass_through: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupColumnConfig {
    pub source: String,
    /// Output column name; defaults to the source name.
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Registry identifier of the row generator.
    pub function: String,
    /// Columns read from the triggering source row, in argument order.
    #[serde(default)]
    pub columns: Vec<String>,
    pub outputs: Vec<OutputColumnConfig>,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputColumnConfig {
    pub name: String,
    #[serde(default = "default_output_type")]
    pub data_type: DataType,
}

fn default_output_type() -> DataType {
    DataType::String
}

/// Parse a pipeline from YAML text.
pub fn parse_pipeline_str(yaml: &str) -> Result<PipelineConfig, EtlError> {
    serde_yaml::from_str(yaml)
        .map_err(|e| EtlError::contract(format!("invalid pipeline config: {e}")))
}

/// Structural checks that do not need a source schema.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<(), EtlError> {
    if config.stages.is_empty() {
        return Err(EtlError::contract(format!(
            "pipeline {} has no stages",
            config.pipeline
        )));
    }
    for stage in &config.stages {
        match stage {
            StageConfig::Sort(sort) => {
                if sort.columns.is_empty() {
                    return Err(EtlError::contract("sort stage has no columns"));
                }
            }
            StageConfig::Validation(validation) => {
                if validation.mappings.is_empty() && !validation.validate_data_types {
                    return Err(EtlError::contract(
                        "validation stage has no mappings and datatype validation is off",
                    ));
                }
            }
            StageConfig::Rows(rows) => {
                if rows.generators.is_empty() {
                    return Err(EtlError::contract("rows stage has no generators"));
                }
                for generator in &rows.generators {
                    if generator.outputs.is_empty() {
                        return Err(EtlError::contract(format!(
                            "generator {} declares no output columns",
                            generator.function
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_pipeline() {
        let yaml = r#"
version: "1.0"
pipeline: clean_people

stages:
  - sort:
      columns:
        - column: id
  - validation:
      mappings:
        - function: not_null
          columns: [email]
          invalid_action: reject
"#;
        let config = parse_pipeline_str(yaml).expect("parse");
        assert_eq!(config.pipeline, "clean_people");
        assert_eq!(config.stages.len(), 2);
        validate_pipeline(&config).expect("validate");

        let StageConfig::Sort(sort) = &config.stages[0] else {
            panic!("expected sort stage");
        };
        assert_eq!(sort.columns[0].direction, SortDirection::Ascending);

        let StageConfig::Validation(validation) = &config.stages[1] else {
            panic!("expected validation stage");
        };
        assert!(validation.validate_data_types);
        assert_eq!(
            validation.mappings[0].invalid_action,
            InvalidAction::Reject
        );
    }

    #[test]
    fn test_parse_rows_stage() {
        let yaml = r#"
version: "1.0"
pipeline: fan_out

stages:
  - rows:
      group:
        - source: region
      generators:
        - function: split_column_to_rows
          columns: [tags]
          outputs:
            - name: tag
          params:
            separator: ","
            row_limit: 10
      pass_through: true
"#;
        let config = parse_pipeline_str(yaml).expect("parse");
        validate_pipeline(&config).expect("validate");
        let StageConfig::Rows(rows) = &config.stages[0] else {
            panic!("expected rows stage");
        };
        assert!(rows.pass_through);
        assert_eq!(rows.group[0].source, "region");
        assert_eq!(rows.generators[0].outputs[0].data_type, DataType::String);
    }

    #[test]
    fn test_empty_stages_rejected() {
        let yaml = r#"
version: "1.0"
pipeline: empty
stages: []
"#;
        let config = parse_pipeline_str(yaml).expect("parse");
        assert!(validate_pipeline(&config).is_err());
    }

    #[test]
    fn test_invalid_yaml_is_contract_error() {
        let err = parse_pipeline_str("{not yaml").expect_err("must fail");
        assert!(matches!(err, EtlError::Contract(_)));
    }
}
