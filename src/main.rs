//! frame-kr CLI: inspect frame models and their configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use frame_kr::builder::{ModelBuilder, ModelEditor, SectionBuilder};
use frame_kr::cardinality::Cardinality;
use frame_kr::config::ModelConfig;
use frame_kr::error::KrResult;
use frame_kr::identity::Identity;
use frame_kr::instance::InstanceGraph;
use frame_kr::model::Model;
use frame_kr::model::disjunction::Disjunction;
use frame_kr::value::{FrameType, Number, NumberKind, NumberType};

#[derive(Parser)]
#[command(name = "frame-kr", version, about = "Frame-based knowledge representation engine")]
struct Cli {
    /// Model config file (TOML). Defaults apply when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the Root -> Animal -> Dog demo model and print its hierarchy.
    Demo {
        /// Print the hierarchy summary as JSON.
        #[arg(long)]
        json: bool,

        /// Cardinality of Animal.legs (single-value, unique-types or free).
        #[arg(long, default_value = "unique-types")]
        legs: Cardinality,
    },

    /// Load a model config and echo it with defaults filled in.
    Config {
        /// Path to the TOML config file.
        path: PathBuf,
    },
}

/// Root -> Animal -> Dog. `legs` takes the chosen cardinality on Animal
/// and is single-valued on Dog, where it defaults to four.
struct DemoSection {
    legs: Cardinality,
}

impl SectionBuilder for DemoSection {
    fn name(&self) -> &str {
        "demo"
    }

    fn build(&mut self, editor: &mut ModelEditor<'_>) -> KrResult<()> {
        let root = editor.root();
        let animal = editor.add_frame(Identity::new("Animal", "Animal"), false)?;
        let dog = editor.add_frame(Identity::new("Dog", "Dog"), false)?;
        editor.add_super(animal, root)?;
        editor.add_super(dog, animal)?;

        let legs = editor.add_property(Identity::new("legs", "number of legs"))?;
        editor.add_slot(
            animal,
            legs,
            self.legs,
            NumberType::unbounded(NumberKind::Integer).into(),
        )?;
        editor.add_slot(
            dog,
            legs,
            Cardinality::SingleValue,
            NumberType::unbounded(NumberKind::Integer).into(),
        )?;
        editor.add_slot_value(dog, legs, Number::Int(4).into())?;
        Ok(())
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ModelConfig> {
    match path {
        Some(path) => Ok(ModelConfig::load(path)?),
        None => Ok(ModelConfig::default()),
    }
}

fn print_hierarchy(model: &Model) {
    let summary = model.summary();
    println!("Model rooted at {} ({} properties)", summary.root, summary.properties);
    for frame in &summary.frames {
        let marker = if frame.hidden { " [hidden]" } else { "" };
        println!("  {}{marker}", frame.label);
        if !frame.supers.is_empty() {
            println!("    supers: {}", frame.supers.join(", "));
        }
        for slot in &frame.slots {
            println!("    slot:   {slot}");
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { json, legs } => {
            let config = load_config(cli.config.as_ref())?;
            let mut builder = ModelBuilder::new(config);
            builder.register(DemoSection { legs });
            let model = builder.build()?;

            if json {
                let out = serde_json::to_string_pretty(&model.summary()).into_diagnostic()?;
                println!("{out}");
                return Ok(());
            }
            print_hierarchy(model);

            let dog = model
                .frame_by_identifier("Dog")
                .ok_or_else(|| miette::miette!("demo model has no Dog frame"))?;
            let legs = model
                .property_by_identifier("legs")
                .ok_or_else(|| miette::miette!("demo model has no legs property"))?;
            let resolved = Disjunction::resolve(model, [FrameType::Model(dog)])?;
            println!();
            println!("resolve([Dog]) = {}", model.describe(&resolved));
            let merged = model.merged_slots(&FrameType::Model(dog))?;
            if let Some(slot) = merged.get(&legs) {
                println!("Dog.legs cardinality after merge: {}", slot.cardinality());
            }

            let mut graph = InstanceGraph::new(model);
            let rex = graph.instantiate(dog)?;
            let values: Vec<String> = graph
                .values(rex, legs)?
                .iter()
                .map(|v| model.describe_value(v))
                .collect();
            println!("{}.legs = [{}]", graph.describe_instance(rex), values.join(", "));
        }

        Commands::Config { path } => {
            let config = ModelConfig::load(&path)?;
            let out = toml::to_string_pretty(&config).into_diagnostic()?;
            println!("# {}", path.display());
            print!("{out}");
        }
    }

    Ok(())
}
