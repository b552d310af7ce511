use anyhow::{bail, Context};
use clap::Parser;
use logmine::config::{ClusterConfig, FailurePolicy, GapPolicy, Normalization, ReductionShape};
use logmine::pipeline::{CancelFlag, Coordinator};
use logmine::report::{render_text, SortOrder, TextOptions};
use logmine::source::ReaderSource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "logmine", version, about = "Cluster log lines into patterns")]
struct Cli {
    /// Input files (`-` for stdin). Reads stdin when omitted.
    #[arg(required = false)]
    input: Vec<String>,

    /// TOML file with clustering settings; flags override it
    #[arg(long = "config")]
    config: Option<String>,

    #[arg(long = "batch-size")] batch_size: Option<usize>,
    /// Max distance for a line to join an existing cluster
    #[arg(long = "assign-threshold", short = 'm', alias = "max-dist")] assign_threshold: Option<f64>,
    /// Max distance for clusters from different batches to merge
    #[arg(long = "merge-threshold")] merge_threshold: Option<f64>,
    #[arg(long = "length-cutoff")] length_cutoff: Option<f64>,
    /// none | numeric | custom
    #[arg(long = "normalize")] normalize: Option<String>,
    /// Named variable `name:/regex/`; implies --normalize custom. May be repeated.
    #[arg(long = "variable", short = 'p')] variables: Vec<String>,
    /// Regex splitting a line into tokens
    #[arg(long = "delimiters", short = 'd')] delimiters: Option<String>,
    /// truncate | pad
    #[arg(long = "gap-policy")] gap_policy: Option<String>,
    /// balanced | sequential
    #[arg(long = "reduction")] reduction: Option<String>,
    /// abort | skip
    #[arg(long = "on-batch-error")] on_batch_error: Option<String>,
    #[arg(long = "min-members", short = 'c')] min_members: Option<usize>,
    #[arg(long = "k1")] k1: Option<f64>,
    #[arg(long = "k2")] k2: Option<f64>,
    #[arg(long = "parallelism")] parallelism: Option<usize>,
    #[arg(long = "threads")] threads: Option<usize>,
    #[arg(long = "max-tokens")] max_tokens: Option<usize>,

    /// Output format: json | text
    #[arg(long = "format", default_value = "json")] format: String,
    /// Sort clusters by count (text output): none | desc | asc
    #[arg(long = "sort", short = 's', default_value = "none")] sort: String,
    #[arg(long = "number-align", default_value_t = false)] number_align: bool,
    /// Text shown for wildcards (text output)
    #[arg(long = "placeholder", default_value = "---")] placeholder: String,
    /// Show the founding line's value instead of a placeholder
    #[arg(long = "show-values", default_value_t = false)] show_values: bool,
    /// Print variable values from the founding line instead of `<name>`
    #[arg(long = "mask-variables", default_value_t = false)] mask_variables: bool,
    /// Colour wildcards and variables when stdout is a terminal
    #[arg(long = "highlight", default_value_t = false)] highlight: bool,
}

fn parse_normalization(s: &str) -> anyhow::Result<Normalization> {
    Ok(match s {
        "none" => Normalization::None,
        "numeric" | "numeric-placeholder" => Normalization::NumericPlaceholder,
        "custom" => Normalization::Custom,
        other => bail!("unknown normalization mode {other:?}"),
    })
}

fn parse_gap_policy(s: &str) -> anyhow::Result<GapPolicy> {
    Ok(match s {
        "truncate" => GapPolicy::Truncate,
        "pad" | "wildcard-pad" => GapPolicy::WildcardPad,
        other => bail!("unknown gap policy {other:?}"),
    })
}

fn parse_reduction(s: &str) -> anyhow::Result<ReductionShape> {
    Ok(match s {
        "balanced" => ReductionShape::Balanced,
        "sequential" => ReductionShape::Sequential,
        other => bail!("unknown reduction shape {other:?}"),
    })
}

fn parse_failure_policy(s: &str) -> anyhow::Result<FailurePolicy> {
    Ok(match s {
        "abort" => FailurePolicy::Abort,
        "skip" => FailurePolicy::Skip,
        other => bail!("unknown batch error policy {other:?}"),
    })
}

fn build_config(cli: &Cli) -> anyhow::Result<ClusterConfig> {
    let mut cfg = match &cli.config {
        Some(path) => ClusterConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => ClusterConfig::default(),
    };
    if let Some(v) = cli.batch_size { cfg.batch_size = v; }
    if let Some(v) = cli.assign_threshold { cfg.assign_threshold = v; }
    if let Some(v) = cli.merge_threshold { cfg.merge_threshold = v; }
    if let Some(v) = cli.length_cutoff { cfg.length_ratio_cutoff = v; }
    if let Some(v) = cli.normalize.as_deref() { cfg.normalization = parse_normalization(v)?; }
    if !cli.variables.is_empty() {
        cfg.variables = cli.variables.clone();
        if cli.normalize.is_none() { cfg.normalization = Normalization::Custom; }
    }
    if let Some(v) = &cli.delimiters { cfg.delimiters = v.clone(); }
    if let Some(v) = cli.gap_policy.as_deref() { cfg.gap_policy = parse_gap_policy(v)?; }
    if let Some(v) = cli.reduction.as_deref() { cfg.reduction = parse_reduction(v)?; }
    if let Some(v) = cli.on_batch_error.as_deref() { cfg.failure_policy = parse_failure_policy(v)?; }
    if let Some(v) = cli.min_members { cfg.min_members = v; }
    if let Some(v) = cli.k1 { cfg.match_weight = v; }
    if let Some(v) = cli.k2 { cfg.variable_weight = v; }
    if let Some(v) = cli.parallelism { cfg.parallelism = v; }
    if let Some(v) = cli.threads { cfg.threads = v; }
    if let Some(v) = cli.max_tokens { cfg.max_tokens = v; }
    cfg.validate()?;
    Ok(cfg)
}

fn init_tracing() {
    // stdout carries the report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logmine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let cancel = CancelFlag::default();
    {
        let c = cancel.clone();
        let _ = ctrlc::set_handler(move || c.cancel());
    }

    let coordinator = Coordinator::new(config)?.with_cancel(cancel);
    let mut source = ReaderSource::open(&cli.input)?;
    let report = coordinator.run_to_report(&mut source)?;

    if cli.format == "text" {
        let sort = match cli.sort.as_str() {
            "desc" => SortOrder::Desc,
            "asc" => SortOrder::Asc,
            _ => SortOrder::None,
        };
        let tty = atty::is(atty::Stream::Stdout);
        let opts = TextOptions {
            sort,
            number_align: cli.number_align,
            placeholder: if cli.show_values { None } else { Some(cli.placeholder.clone()) },
            mask_variables: cli.mask_variables,
            highlight_patterns: cli.highlight && tty,
            highlight_variables: cli.highlight && tty,
        };
        print!("{}", render_text(&report, &opts));
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
