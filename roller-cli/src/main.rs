use clap::Parser;
use std::path::PathBuf;

use roller_core::{
    roll, roll_items, Catalog, DirImageResolver, ImageResolver, ItemRollRequest,
    NullImageResolver, RollRequest, SourceTable,
};

#[derive(Debug, Parser)]
#[command(name = "roller", version, about = "Monster and item roll tool")]
struct Args {
    /// Catalog JSON file with monster and item tables.
    #[arg(long)]
    catalog: PathBuf,

    /// Artwork directory; species art is matched by file stem.
    #[arg(long)]
    images: Option<PathBuf>,

    /// Seed string; omitted means a fresh random seed, echoed in the output.
    #[arg(long)]
    seed: Option<String>,

    /// How many monsters (or item draws with --items) to roll.
    #[arg(long, default_value_t = 1)]
    count: usize,

    /// Roll items instead of monsters.
    #[arg(long, default_value_t = false)]
    items: bool,

    /// Item categories to draw from; empty means all.
    #[arg(long, value_delimiter = ',')]
    categories: Vec<String>,

    /// Source tables to draw species from; empty means all.
    #[arg(long, value_delimiter = ',')]
    tables: Vec<SourceTable>,

    /// Allow-list for the lead species slot.
    #[arg(long, value_delimiter = ',')]
    include_species: Vec<String>,

    /// Species removed from every species slot.
    #[arg(long, value_delimiter = ',')]
    exclude_species: Vec<String>,

    /// Allow-list for the lead type slot.
    #[arg(long, value_delimiter = ',')]
    include_types: Vec<String>,

    /// Types removed from every type slot.
    #[arg(long, value_delimiter = ',')]
    exclude_types: Vec<String>,

    /// Force the attribute instead of drawing one.
    #[arg(long)]
    attribute: Option<String>,

    #[arg(long)]
    species_min: Option<usize>,

    #[arg(long)]
    species_max: Option<usize>,

    #[arg(long)]
    types_min: Option<usize>,

    #[arg(long)]
    types_max: Option<usize>,

    /// Filter species by legendary flag on tables that carry it.
    #[arg(long)]
    legendary: Option<bool>,

    /// Filter species by mythical flag on tables that carry it.
    #[arg(long)]
    mythical: Option<bool>,

    /// Restrict to legendary-capable tables and legendary species.
    #[arg(long, default_value_t = false)]
    only_legendary: bool,

    /// Restrict to mythical-capable tables and mythical species.
    #[arg(long, default_value_t = false)]
    only_mythical: bool,

    /// Substring match against species family names.
    #[arg(long)]
    family: Option<String>,

    /// Pretty-print the JSON output.
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let catalog = match Catalog::from_json_file(&args.catalog) {
        Ok(catalog) => catalog,
        Err(err) => {
            eprintln!("Failed to load catalog {:?}: {}", args.catalog, err);
            std::process::exit(1);
        }
    };

    let images: Box<dyn ImageResolver> = match args.images.as_ref() {
        Some(dir) => Box::new(DirImageResolver::new(dir)),
        None => Box::new(NullImageResolver),
    };

    let output = if args.items {
        let request = ItemRollRequest {
            categories: args.categories.clone(),
            seed: args.seed.clone(),
            count: Some(args.count),
        };
        roll_items(&catalog, images.as_ref(), &request).map(|outcome| to_json(&outcome, args.pretty))
    } else {
        let request = build_request(&args);
        roll(&catalog, images.as_ref(), &request).map(|outcome| to_json(&outcome, args.pretty))
    };

    match output {
        Ok(json) => println!("{json}"),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}

fn build_request(args: &Args) -> RollRequest {
    let mut request = RollRequest {
        tables: args.tables.clone(),
        attribute: args.attribute.clone(),
        legendary: args.legendary,
        mythical: args.mythical,
        only_legendary: args.only_legendary,
        only_mythical: args.only_mythical,
        family: args.family.clone(),
        species_min: args.species_min,
        species_max: args.species_max,
        types_min: args.types_min,
        types_max: args.types_max,
        seed: args.seed.clone(),
        count: Some(args.count),
        ..Default::default()
    };
    request.species_slots[0].include = args.include_species.clone();
    for slot in request.species_slots.iter_mut() {
        slot.exclude = args.exclude_species.clone();
    }
    request.type_slots[0].include = args.include_types.clone();
    for slot in request.type_slots.iter_mut() {
        slot.exclude = args.exclude_types.clone();
    }
    request
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    } else {
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    }
}
