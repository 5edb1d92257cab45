use crate::config::Config;
use schemars::gen::SchemaSettings;

/// Print the draft-07 JSON Schema of `devplan.yaml`
pub fn execute() -> anyhow::Result<()> {
    let schema = SchemaSettings::draft07()
        .into_generator()
        .into_root_schema_for::<Config>();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
