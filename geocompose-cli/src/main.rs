//! geocompose CLI - detect, parse and compose geospatial files

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use geocompose::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "geocompose")]
#[command(author, version, about = "Geospatial normalization and map composition", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the detected format of each file
    Detect {
        files: Vec<PathBuf>,
    },
    /// Parse a file and print a feature summary
    Parse {
        file: PathBuf,
        /// Skip detection and parse as this format
        #[arg(short, long)]
        format: Option<DataFormat>,
        /// Print the feature collection as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compose one layer per file into a map
    Compose {
        files: Vec<PathBuf>,
        /// Skip detection and parse every file as this format
        #[arg(short, long)]
        format: Option<DataFormat>,
        /// Treat files as JSON arrays of row objects
        #[arg(long)]
        table: bool,
        #[command(flatten)]
        columns: ColumnArgs,
        /// sum, avg, count, min, max or none
        #[arg(short, long, default_value = "none")]
        aggregation: AggregationMode,
        /// Print the composed map as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ColumnArgs {
    #[arg(long)]
    lat: Option<String>,
    #[arg(long)]
    lon: Option<String>,
    #[arg(long)]
    geojson: Option<String>,
    #[arg(long)]
    wkt: Option<String>,
    #[arg(long)]
    path: Option<String>,
    #[arg(long)]
    polygon: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    height: Option<String>,
}

impl ColumnArgs {
    fn mapping(&self) -> ColumnMapping {
        ColumnMapping {
            latitude_column: self.lat.clone(),
            longitude_column: self.lon.clone(),
            geo_json_column: self.geojson.clone(),
            wkt_column: self.wkt.clone(),
            path_column: self.path.clone(),
            polygon_column: self.polygon.clone(),
            category_column: self.category.clone(),
            color_column: self.color.clone(),
            height_column: self.height.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Detect { files } => {
            for file in files {
                let input = read_input(&file)?;
                match FormatDetector::detect_strict(&input) {
                    Ok(format) => println!("{}: {}", file.display(), format),
                    Err(e) => println!("{}: {}", file.display(), e),
                }
            }
        }
        Commands::Parse { file, format, json } => {
            let registry = Arc::new(ParserRegistry::new());
            let input = read_input(&file)?;
            let outcome = parse_in_background(registry, input, format).await;
            let format = outcome.format;
            let collection = outcome
                .into_result()
                .with_context(|| format!("Failed to parse {}", file.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&collection)?);
            } else {
                println!("{} ({}): {} features", file.display(), format, collection.len());
                println!("geometry types: {}", collection.geometry_kinds().join(", "));
            }
        }
        Commands::Compose {
            files,
            format,
            table,
            columns,
            aggregation,
            json,
        } => {
            if files.is_empty() {
                bail!("No input files given");
            }
            let settings = LayerSettings::default()
                .with_columns(columns.mapping())
                .with_aggregation(aggregation);

            let mut sources = Vec::with_capacity(files.len());
            for (index, file) in files.iter().enumerate() {
                let label = file
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("layer-{}", index));
                let source = if table {
                    let bytes = std::fs::read(file)
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
                    let rows = TabularData::from_json(&value)?;
                    LayerSource::tabular(format!("layer-{}", index), label, rows)
                } else {
                    let mut source =
                        LayerSource::raw(format!("layer-{}", index), label, read_input(file)?);
                    source.format = format;
                    source
                };
                sources.push(source.with_settings(settings.clone()));
            }

            let composer = Arc::new(LayerComposer::default());
            let map = compose_in_background(composer, sources).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                print_summary(&map);
            }
        }
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<SourceInput> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path.to_string_lossy().into_owned();
    let input = match String::from_utf8(bytes) {
        Ok(text) => SourceInput::text(text),
        Err(e) => SourceInput::binary(e.into_bytes()),
    };
    Ok(input.with_file_name(name))
}

fn print_summary(map: &ComposedMap) {
    for layer in &map.layers {
        let format = layer
            .format
            .map(|f| f.to_string())
            .unwrap_or_else(|| "table".to_string());
        println!("layer {} ({}, {})", layer.id, layer.source_ref, format);
        if let Some(error) = &layer.error {
            println!("  error: {}", error);
            continue;
        }
        if !layer.has_geometry_selection {
            println!("  select latitude/longitude or a geometry column");
        } else if !layer.has_renderable_data {
            println!("  geometry not found for selected columns");
        }
        println!(
            "  rows: {} resolved, {} without geometry",
            layer.stats.resolved_rows, layer.stats.no_geometry_rows
        );
        for stale in &layer.stale_columns {
            println!("  dropped {} column '{}'", stale.role, stale.column);
        }
        if let Some(issue) = &layer.aggregation_issue {
            println!("  aggregation: {}", issue);
        }
        for entry in &layer.legend {
            println!("  {} {}", entry.color.to_hex(), entry.category);
        }
    }

    let dataset = &map.dataset;
    println!(
        "points: {}, paths: {}, polygons: {}, features: {}",
        dataset.points.len(),
        dataset.paths.len(),
        dataset.polygons.len(),
        dataset.geo_json_features.len()
    );
    match (map.bounds, map.view_state) {
        (Some(bounds), Some(view)) => {
            let [[west, south], [east, north]] = <[[f64; 2]; 2]>::from(bounds);
            println!("bounds: [[{}, {}], [{}, {}]]", west, south, east, north);
            println!(
                "view: lon {:.4}, lat {:.4}, zoom {:.2}",
                view.longitude, view.latitude, view.zoom
            );
        }
        _ => println!("bounds: none"),
    }
}
