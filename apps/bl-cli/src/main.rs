use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use device_registry as devreg;
use device_registry::devices::{Dg645, SocketDg645};
use device_registry::plans;

mod config;
mod session;
mod xref;

use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "bl",
    version,
    about = "12-ID beamline device manifests",
    disable_help_subcommand = true
)]
struct Cli {
    /// CLI config file (JSON)
    #[arg(long, default_value = "configs/bl.json", global = true)]
    config: String,

    /// Manifest file or directory; repeat to load several. Overrides the config.
    #[arg(long = "manifest", global = true)]
    manifests: Vec<PathBuf>,

    /// Skip bad entries instead of failing the load
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    lenient: bool,

    /// Later duplicate names replace earlier ones
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    overwrite: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the manifests and report the result
    Validate {
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List registered devices
    List {
        /// Only devices carrying this label
        #[arg(long)]
        label: Option<String>,
    },
    /// Show the channel map of one device
    Show {
        name: String,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List the factory table
    Factories,
    /// Look up a legacy command in the cross-reference table
    Xref {
        /// Cross-reference file (defaults to the config's)
        #[arg(long)]
        file: Option<String>,
        /// Legacy command; omit to print the whole table
        command: Option<String>,
    },
    /// Render a DG645 burst plan
    Burst {
        /// Registered DG645 name
        device: String,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
        #[command(subcommand)]
        action: BurstAction,
    },
    /// Resolve and print load metrics (Prometheus text format)
    Metrics,
    /// Start the interactive session
    Session {
        #[arg(long)]
        environment: Option<String>,
        #[arg(long)]
        startup_module: Option<String>,
        #[arg(long)]
        program: Option<String>,
    },
    /// Write the default config file
    ConfigInit {
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum BurstAction {
    Init,
    Set {
        #[arg(long, default_value_t = 1)]
        cycles: u32,
        /// Seconds between pulses
        #[arg(long)]
        period: f64,
        /// Seconds before the first pulse
        #[arg(long, default_value_t = 0.0)]
        delay: f64,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match &cli.command {
        Commands::Validate { json } => validate(&cli, &cfg, *json),
        Commands::List { label } => list(&cli, &cfg, label.as_deref()),
        Commands::Show { name, json } => show(&cli, &cfg, name, *json),
        Commands::Factories => factories(),
        Commands::Xref { file, command } => xref_lookup(
            file.as_deref().unwrap_or(&cfg.xref),
            command.as_deref(),
        ),
        Commands::Burst {
            device,
            json,
            action,
        } => burst(&cli, &cfg, device, action, *json),
        Commands::Metrics => metrics(&cli, &cfg),
        Commands::Session {
            environment,
            startup_module,
            program,
        } => {
            let mut s = cfg.session.clone();
            if let Some(e) = environment {
                s.environment = e.clone();
            }
            if let Some(m) = startup_module {
                s.startup_module = m.clone();
            }
            if let Some(p) = program {
                s.program = p.clone();
            }
            let code = session::run(&s)?;
            std::process::exit(code);
        }
        Commands::ConfigInit { force } => config_init(&cli.config, *force),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn resolver_config(cli: &Cli, cfg: &Config) -> devreg::ResolverConfig {
    devreg::ResolverConfig {
        duplicates: if cli.overwrite {
            devreg::DuplicatePolicy::Overwrite
        } else {
            cfg.duplicates
        },
        failure: if cli.lenient {
            devreg::FailureMode::Lenient
        } else {
            cfg.failure
        },
    }
}

fn load(
    cli: &Cli,
    cfg: &Config,
    metrics: Option<&devreg::ManifestMetrics>,
) -> Result<(devreg::Manifest, devreg::Resolution)> {
    let paths: Vec<PathBuf> = if cli.manifests.is_empty() {
        cfg.manifests.iter().map(PathBuf::from).collect()
    } else {
        cli.manifests.clone()
    };
    if paths.is_empty() {
        bail!("no manifests given; pass --manifest <path> or list them in {}", cli.config);
    }
    let manifest = devreg::load_manifests(&paths).context("loading device manifests")?;
    let table = devreg::FactoryTable::builtin();
    let mut resolver = devreg::Resolver::new(&table, resolver_config(cli, cfg));
    if let Some(m) = metrics {
        resolver = resolver.with_metrics(m);
    }
    let resolution = resolver
        .resolve_report(&manifest)
        .context("resolving device manifests")?;
    Ok((manifest, resolution))
}

fn validate(cli: &Cli, cfg: &Config, json: bool) -> Result<()> {
    let (manifest, r) = load(cli, cfg, None)?;
    for s in &r.skipped {
        warn!(factory = %s.factory, entry = %s.entry, "skipped: {}", s.error);
    }
    let when = r
        .registry
        .loaded_at()
        .map(|t| t.format(&Rfc3339))
        .transpose()?
        .unwrap_or_default();
    println!(
        "ok: {} devices from {} entries in {} documents ({} skipped) at {when}",
        r.registry.len(),
        manifest.entry_count(),
        manifest.documents.len(),
        r.skipped.len()
    );
    if json {
        let infos: Vec<devreg::DeviceInfo> = r
            .registry
            .iter()
            .map(|d| devreg::DeviceInfo::of(&**d))
            .collect();
        println!("{}", serde_json::to_string_pretty(&infos)?);
    }
    r.registry.close();
    Ok(())
}

fn list(cli: &Cli, cfg: &Config, label: Option<&str>) -> Result<()> {
    let (_, r) = load(cli, cfg, None)?;
    let devices: Vec<&devreg::DeviceHandle> = match label {
        Some(l) => r.registry.by_label(l).collect(),
        None => r.registry.iter().collect(),
    };
    for d in devices {
        println!(
            "{}\tclass={}\tcapability={}\tprefix={}\tlabels={}",
            d.name(),
            d.class(),
            d.capability(),
            d.meta().prefix,
            d.labels().join(",")
        );
    }
    Ok(())
}

fn show(cli: &Cli, cfg: &Config, name: &str, json: bool) -> Result<()> {
    let (_, r) = load(cli, cfg, None)?;
    let dev = r
        .registry
        .get(name)
        .ok_or_else(|| anyhow!("no device named `{name}`"))?;
    let channels = dev.channels();
    if json {
        println!("{}", serde_json::to_string_pretty(&channels)?);
        return Ok(());
    }
    println!("{} ({}, {})", dev.name(), dev.class(), dev.capability());
    if let Some(s) = dev.as_any().downcast_ref::<SocketDg645>() {
        for line in socket_lines(s) {
            println!("  {line}");
        }
    }
    for c in channels {
        match c.readback {
            Some(rb) => println!("  {}\t{}\t{}\t{:?}", c.attr, c.address, rb, c.access),
            None => println!("  {}\t{}\t\t{:?}", c.attr, c.address, c.access),
        }
    }
    Ok(())
}

fn socket_lines(s: &SocketDg645) -> Vec<String> {
    let mut lines = vec![
        format!("socket {}", s.address()),
        format!("burst maxtime limit {} s", s.burst_maxtime_limit()),
    ];
    for (code, source) in SocketDg645::trigger_sources().iter().enumerate() {
        lines.push(format!("trigger source {code}\t{source}"));
    }
    for (label, query) in SocketDg645::status_queries() {
        lines.push(format!("status {}\t{label}", query.trim_end()));
    }
    lines
}

fn factories() -> Result<()> {
    let table = devreg::FactoryTable::builtin();
    for def in table.iter() {
        println!(
            "{}\t{}\trequired={}\toptional={}",
            def.id,
            def.capability,
            def.schema.required.join(","),
            def.schema.optional.join(",")
        );
    }
    for role in devreg::Role::ALL {
        for class in table.catalog().classes(role) {
            println!("override\t{role}\t{class}");
        }
    }
    Ok(())
}

fn xref_lookup(path: &str, command: Option<&str>) -> Result<()> {
    let rows = xref::load(path)?;
    match command {
        Some(c) => {
            let row = xref::lookup(&rows, c)
                .ok_or_else(|| anyhow!("`{c}` is not in the cross-reference ({path})"))?;
            println!("{}\t{}\t{}", row.legacy, row.procedure, row.notes);
        }
        None => {
            for row in &rows {
                println!("{}\t{}\t{}", row.legacy, row.procedure, row.notes);
            }
        }
    }
    Ok(())
}

fn burst(cli: &Cli, cfg: &Config, device: &str, action: &BurstAction, json: bool) -> Result<()> {
    let (_, r) = load(cli, cfg, None)?;
    let dg = r
        .registry
        .get_as::<Dg645>(device)
        .ok_or_else(|| anyhow!("`{device}` is not a registered EPICS DG645"))?;
    let plan = match action {
        BurstAction::Init => plans::burst_init(dg),
        BurstAction::Set {
            cycles,
            period,
            delay,
        } => plans::burst_set(dg, *cycles, *period, *delay)?,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        for msg in &plan {
            println!("{msg}");
        }
    }
    Ok(())
}

fn metrics(cli: &Cli, cfg: &Config) -> Result<()> {
    let hub = devreg::MetricsHub::new().map_err(|e| anyhow!(e))?;
    let (_, r) = load(cli, cfg, Some(&hub.manifest))?;
    info!(devices = r.registry.len(), "manifest loaded");
    print!("{}", hub.encode_text());
    Ok(())
}

fn config_init(path: &str, force: bool) -> Result<()> {
    if std::path::Path::new(path).exists() && !force {
        bail!("{path} already exists; pass --force to overwrite");
    }
    Config::default().save(path)?;
    println!("wrote {path}");
    Ok(())
}
