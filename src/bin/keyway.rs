//! Binary entry point for the keyway planning CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use keyway::cli::{
    item_to_json, load_topology, parse_condition, parse_key, BucketFixture, CliError, Fixture,
};
use keyway::config::EngineConfig;
use keyway::query::{
    plan, strategy, ListingStrategy, PageKey, QueryParams, QueryParamsBuilder, RetrievalStrategy,
    SortOrder, UnprocessedKeyPolicy,
};
use keyway::QueryError;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "keyway",
    version,
    about = "Plan and run condition-based reads against partitioned key-value tables",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, env = "KEYWAY_CONFIG", help = "Engine config file (TOML)")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
struct ConditionArgs {
    #[arg(
        long = "where",
        value_name = "ATTR OP [VALUES]",
        help = "Condition, repeatable (e.g. 'race = hobbit', 'age between 30,60')"
    )]
    conditions: Vec<String>,

    #[arg(long, help = "Maximum page size (defaults to the configured page size)")]
    limit: Option<usize>,

    #[arg(long, help = "Traverse the sort key descending")]
    desc: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the access path and rendered expressions for a request.
    Plan {
        #[arg(long, value_name = "FILE", help = "Table topology (.toml or .json)")]
        topology: PathBuf,
        #[command(flatten)]
        request: ConditionArgs,
        #[arg(long, help = "Replace literal values with '?'")]
        redact: bool,
    },
    /// Run one page of a request against a fixture table.
    Query {
        #[arg(long, value_name = "FILE", help = "JSON fixture with table, topology and items")]
        fixture: PathBuf,
        #[command(flatten)]
        request: ConditionArgs,
        #[arg(long, value_name = "TOKEN", help = "Cursor printed by a previous page")]
        cursor: Option<String>,
        #[arg(long, help = "Ignore the topology and always scan")]
        scan_only: bool,
    },
    /// Fetch items of a fixture table by primary key.
    BatchGet {
        #[arg(long, value_name = "FILE", help = "JSON fixture with table, topology and items")]
        fixture: PathBuf,
        #[arg(long = "key", value_name = "ATTR=VALUE[,ATTR=VALUE]", required = true)]
        keys: Vec<String>,
        #[arg(long, help = "Drop unprocessed keys instead of failing")]
        drop_unprocessed: bool,
    },
    /// List one page of a fixture bucket, narrowed by a key prefix condition.
    List {
        #[arg(long, value_name = "FILE", help = "JSON fixture with bucket and objects")]
        objects: PathBuf,
        #[command(flatten)]
        request: ConditionArgs,
        #[arg(long, value_name = "TOKEN", help = "Cursor printed by a previous page")]
        cursor: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Plan {
            topology,
            request,
            redact,
        } => {
            let topology = load_topology(&topology)?;
            let params = params(&config, &request, None)?.build()?;
            let plan = plan(&params, &topology);
            let exprs = strategy::render(&plan)?;
            let explain = plan.explain();
            match cli.format {
                OutputFormat::Text => {
                    print!("{}", explain.render(redact));
                    if let Some(key) = &exprs.key_condition {
                        println!("key condition: {key}");
                    }
                    if let Some(filter) = &exprs.filter {
                        println!("filter: {filter}");
                    }
                    for (alias, name) in &exprs.placeholders.names {
                        println!("  {alias} = {name}");
                    }
                    for (placeholder, value) in &exprs.placeholders.values {
                        let value = if redact { "?".to_string() } else { value.to_string() };
                        println!("  {placeholder} = {value}");
                    }
                }
                OutputFormat::Json => {
                    let values: serde_json::Map<_, _> = exprs
                        .placeholders
                        .values
                        .iter()
                        .map(|(k, v)| {
                            let v = if redact { json!("?") } else { serde_json::Value::from(v) };
                            (k.clone(), v)
                        })
                        .collect();
                    let doc = json!({
                        "path": plan.path.name(),
                        "index": plan.path.index_name(),
                        "key_condition": exprs.key_condition,
                        "filter": exprs.filter,
                        "names": exprs.placeholders.names,
                        "values": values,
                    });
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                }
            }
        }
        Command::Query {
            fixture,
            request,
            cursor,
            scan_only,
        } => {
            let table = Fixture::load(&fixture)?.into_table()?;
            let cursor = cursor.as_deref().map(PageKey::decode).transpose()?;
            let params = params(&config, &request, cursor)?.build()?;
            let strategy = if scan_only {
                RetrievalStrategy::Scan
            } else {
                RetrievalStrategy::from_cache(&config.topology_cache(), &table, table.name())?
            };
            let result = strategy.execute(&table, table.name(), &params)?;
            let next = result.next_key().map(PageKey::encode).transpose()?;
            match cli.format {
                OutputFormat::Text => {
                    for item in result.items() {
                        println!("{}", item_to_json(item));
                    }
                    println!("truncated: {}", result.is_truncated());
                    if let Some(next) = next {
                        println!("next cursor: {next}");
                    }
                }
                OutputFormat::Json => {
                    let items: Vec<_> = result.items().iter().map(item_to_json).collect();
                    let doc = json!({
                        "items": items,
                        "truncated": result.is_truncated(),
                        "next_cursor": next,
                    });
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                }
            }
        }
        Command::BatchGet {
            fixture,
            keys,
            drop_unprocessed,
        } => {
            let table = Fixture::load(&fixture)?.into_table()?;
            let keys = keys
                .iter()
                .map(|k| parse_key(k))
                .collect::<Result<Vec<_>, CliError>>()?;
            let mut getter = config.batch_getter(table.name());
            if drop_unprocessed {
                getter = getter.with_policy(UnprocessedKeyPolicy::Drop);
            }
            let items = match getter.get(&table, &keys) {
                Ok(items) => items,
                Err(QueryError::PartialBatch { unprocessed, .. }) => {
                    return Err(format!("{} key(s) were left unprocessed", unprocessed.len()).into())
                }
                Err(err) => return Err(err.into()),
            };
            let items: Vec<_> = items.iter().map(item_to_json).collect();
            match cli.format {
                OutputFormat::Text => {
                    for item in &items {
                        println!("{item}");
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
            }
        }
        Command::List {
            objects,
            request,
            cursor,
        } => {
            let fixture = BucketFixture::load(&objects)?;
            let listing = config.listing_strategy().unwrap_or_else(|| {
                ListingStrategy::new(fixture.bucket.clone()).with_prefix_field("key")
            });
            let bucket = fixture.into_bucket();
            let cursor = cursor.as_deref().map(PageKey::decode).transpose()?;
            let params = params(&config, &request, cursor)?.build()?;
            let result = listing.execute(&bucket, &params)?;
            let next = result.next_key().map(PageKey::encode).transpose()?;
            match cli.format {
                OutputFormat::Text => {
                    for object in result.items() {
                        println!("{}\t{}", object.key, object.size);
                    }
                    println!("truncated: {}", result.is_truncated());
                    if let Some(next) = next {
                        println!("next cursor: {next}");
                    }
                }
                OutputFormat::Json => {
                    let doc = json!({
                        "bucket": listing.bucket(),
                        "objects": result.items(),
                        "truncated": result.is_truncated(),
                        "next_cursor": next,
                    });
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                }
            }
        }
    }
    Ok(())
}

fn params(
    config: &EngineConfig,
    args: &ConditionArgs,
    cursor: Option<PageKey>,
) -> Result<QueryParamsBuilder, CliError> {
    let conditions = args
        .conditions
        .iter()
        .map(|c| parse_condition(c))
        .collect::<Result<Vec<_>, _>>()?;
    let order = if args.desc {
        SortOrder::Descending
    } else {
        SortOrder::Ascending
    };
    Ok(QueryParams::builder()
        .conditions(conditions)
        .max_page_size(args.limit.unwrap_or(config.default_page_size))
        .maybe_cursor(cursor)
        .sort_order(order))
}
