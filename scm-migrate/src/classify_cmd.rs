use anyhow::Result;
use scm_migrate::classifier::DefaultClassifier;
use scm_migrate::config::EngineConfig;
use scm_migrate::report::{classify_rows, render_classification};

use crate::cli::{ClassifyArgs, OutputFormat};
use crate::load_graph;

pub fn run_classify(args: ClassifyArgs, config: &EngineConfig) -> Result<()> {
    let graph = load_graph(&args.graph)?;
    let classifier = DefaultClassifier::new(config.catalog());
    let rows = classify_rows(&graph, &classifier);

    match args.format {
        OutputFormat::Text => println!("{}", render_classification(&rows)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }
    Ok(())
}
