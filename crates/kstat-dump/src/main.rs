use std::fmt;
use std::rc::Rc;

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tracing::{Level, debug};
use tracing_subscriber::EnvFilter;

use kstat::{Backend, Kstat, KstatError, KstatKind, NamedValue, RawKind, Session};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kstat-dump", about = "Print kernel statistics")]
struct Cli {
    /// Selector `module:instance:name[:statistic]`; empty parts match anything
    spec: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Read from the built-in mock system instead of the kernel
    #[arg(long)]
    mock: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let selector = match cli.spec.as_deref().map(Selector::parse).transpose() {
        Ok(s) => s.unwrap_or_default(),
        Err(e) => {
            eprintln!("Invalid selector: {e}");
            std::process::exit(2);
        }
    };

    let result = if cli.mock || !cfg!(any(target_os = "solaris", target_os = "illumos")) {
        debug!("using mock kstat backend");
        run::<kstat::MockBackend>(&selector, cli.json)
    } else {
        run_native(&selector, cli.json)
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
fn run_native(selector: &Selector, json: bool) -> Result<(), DumpError> {
    run::<kstat::LibKstat>(selector, json)
}

#[cfg(not(any(target_os = "solaris", target_os = "illumos")))]
fn run_native(selector: &Selector, json: bool) -> Result<(), DumpError> {
    run::<kstat::MockBackend>(selector, json)
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["kstat", "kstat_dump"] {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum DumpError {
    Kstat(KstatError),
    Json(serde_json::Error),
}

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpError::Kstat(e) => write!(f, "{}", e),
            DumpError::Json(e) => write!(f, "JSON encoding failed: {}", e),
        }
    }
}

impl From<KstatError> for DumpError {
    fn from(e: KstatError) -> Self {
        DumpError::Kstat(e)
    }
}

impl From<serde_json::Error> for DumpError {
    fn from(e: serde_json::Error) -> Self {
        DumpError::Json(e)
    }
}

// ── Selector ─────────────────────────────────────────────────────────────────

/// Parsed `module:instance:name[:statistic]`.
#[derive(Debug, Default, PartialEq)]
struct Selector {
    module: Option<String>,
    instance: Option<i32>,
    name: Option<String>,
    stat: Option<String>,
}

impl Selector {
    fn parse(spec: &str) -> Result<Self, String> {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() > 4 {
            return Err(format!("too many fields in '{spec}'"));
        }
        let field = |i: usize| {
            parts
                .get(i)
                .filter(|p| !p.is_empty() && **p != "*")
                .map(|p| p.to_string())
        };
        let instance = field(1)
            .map(|s| s.parse::<i32>())
            .transpose()
            .map_err(|e| format!("bad instance in '{spec}': {e}"))?;
        Ok(Self {
            module: field(0),
            // -1 is the usual "any instance"
            instance: instance.filter(|i| *i >= 0),
            name: field(2),
            stat: field(3),
        })
    }

    fn matches<B: Backend>(&self, ks: &Kstat<B>) -> bool {
        self.module.as_deref().is_none_or(|m| m == ks.module())
            && self.instance.is_none_or(|i| i == ks.instance())
            && self.name.as_deref().is_none_or(|n| n == ks.name())
    }
}

// ── Collection ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DumpJson {
    collected_at: String,
    kstats: Vec<KstatJson>,
}

#[derive(Serialize)]
struct KstatJson {
    module: String,
    instance: i32,
    name: String,
    class: String,
    kind: String,
    crtime: i64,
    snaptime: i64,
    data: Value,
}

#[derive(Serialize)]
struct NamedJson {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    value: NamedValue,
}

fn run<B: Backend>(selector: &Selector, json: bool) -> Result<(), DumpError> {
    let session = Session::<B>::open()?;
    let collected_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut out = Vec::new();
    for ks in session.all().into_iter().filter(|ks| selector.matches(ks)) {
        if selector.stat.is_some() && ks.kind() != KstatKind::Named {
            continue;
        }
        match collect(&ks, selector.stat.as_deref()) {
            Ok(Some(entry)) => out.push(entry),
            Ok(None) => {}
            // a kstat may vanish between listing and reading
            Err(DumpError::Kstat(KstatError::Native(e))) => {
                debug!(kstat = %ks, error = %e, "skipping kstat");
            }
            Err(e) => return Err(e),
        }
    }
    session.close()?;

    if json {
        let dump = DumpJson {
            collected_at,
            kstats: out,
        };
        println!("{}", serde_json::to_string_pretty(&dump)?);
    } else {
        println!("# collected at {collected_at}");
        for entry in &out {
            print_entry(entry);
        }
    }
    Ok(())
}

fn collect<B: Backend>(
    ks: &Rc<Kstat<B>>,
    stat: Option<&str>,
) -> Result<Option<KstatJson>, DumpError> {
    let data = match ks.kind() {
        KstatKind::Named => {
            ks.refresh()?;
            let records = match stat {
                Some(stat) => match ks.get_named(stat) {
                    Ok(n) => vec![n],
                    Err(KstatError::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(e.into()),
                },
                None => ks.all_named()?,
            };
            let named: Vec<NamedJson> = records
                .into_iter()
                .map(|n| NamedJson {
                    name: n.name,
                    data_type: n.data_type.to_string(),
                    value: n.value,
                })
                .collect();
            serde_json::to_value(&named)?
        }
        KstatKind::Io => serde_json::to_value(ks.get_io()?)?,
        KstatKind::Raw(kind) => {
            ks.refresh()?;
            match kind {
                RawKind::Sysinfo => serde_json::to_value(ks.raw()?.decode::<kstat::Sysinfo>()?)?,
                RawKind::Vminfo => serde_json::to_value(ks.raw()?.decode::<kstat::Vminfo>()?)?,
                RawKind::Var => serde_json::to_value(ks.raw()?.decode::<kstat::Var>()?)?,
                RawKind::Mntinfo => serde_json::to_value(ks.mntinfo()?)?,
                RawKind::Generic => raw_summary(ks)?,
            }
        }
        KstatKind::Unsupported(_) => {
            ks.refresh()?;
            raw_summary(ks)?
        }
    };

    Ok(Some(KstatJson {
        module: ks.module().to_string(),
        instance: ks.instance(),
        name: ks.name().to_string(),
        class: ks.class().to_string(),
        kind: ks.kind().to_string(),
        crtime: ks.crtime(),
        snaptime: ks.snaptime(),
        data,
    }))
}

fn raw_summary<B: Backend>(ks: &Kstat<B>) -> Result<Value, KstatError> {
    let blob = ks.raw()?;
    Ok(serde_json::json!({ "size": blob.len(), "ndata": blob.ndata }))
}

// ── Text output ──────────────────────────────────────────────────────────────

fn print_entry(entry: &KstatJson) {
    let prefix = format!("{}:{}:{}", entry.module, entry.instance, entry.name);
    match &entry.data {
        Value::Array(records) => {
            for rec in records {
                println!(
                    "{}:{}\t{}\t{}",
                    prefix,
                    rec["name"].as_str().unwrap_or_default(),
                    rec["type"].as_str().unwrap_or_default(),
                    plain(&rec["value"])
                );
            }
        }
        Value::Object(fields) => {
            println!("{}:class\t{}", prefix, entry.class);
            for (field, value) in fields {
                println!("{}:{}\t{}", prefix, field, plain(value));
            }
        }
        other => println!("{}\t{}", prefix, plain(other)),
    }
    println!("{}:snaptime\t{}", prefix, entry.snaptime);
}

fn plain(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
