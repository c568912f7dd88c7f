use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use sumlab_app::{
    ChannelProgress, CoordinatorError, DistributionRequest, DistributionUseCase, ExperimentRequest,
    ExperimentUseCase, ExportFormat, ExportUseCase, GenerateRequest, GenerateUseCase,
    RunCoordinator, SystemClock, distribution_from_receipt,
};
use sumlab_distribution::valid_params;
use sumlab_error::{RequestError, ResourceBusy, SamplingError, SumlabError};
use sumlab_types::{
    Algorithm, ConfigFile, DataKind, DatasetFile, DistributionReceipt, ExperimentMode,
    ExperimentReport, ExperimentSpec, Operation, ToolInfo,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "sumlab",
    version,
    about = "Measure how reduction order changes floating-point results"
)]
struct Cli {
    /// Log format on stderr (filter with RUST_LOG)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile a distribution spec and emit a distribution receipt (JSON).
    Distribution {
        /// e.g. "N(0,1) + U(-1,1)" or "exp(-x) * x"
        #[arg(long)]
        spec: String,

        /// Number of bins (> 1)
        #[arg(long, default_value_t = 1000)]
        bins: i64,

        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        lower: f64,

        #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
        upper: f64,

        #[arg(long, default_value = "sumlab-distribution.json")]
        out: PathBuf,

        /// Pretty-print JSON
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },

    /// Draw a dataset from a distribution receipt and emit it (JSON).
    Generate {
        /// Distribution receipt produced by `sumlab distribution`
        #[arg(long)]
        distribution: PathBuf,

        /// Number of elements (scalars or matrices)
        #[arg(long, default_value_t = 10_000, allow_negative_numbers = true)]
        count: i64,

        /// Draw `size x size` matrices instead of scalars
        #[arg(long, allow_negative_numbers = true)]
        matrix_size: Option<i64>,

        /// RNG seed (random when omitted)
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value = "sumlab-dataset.json")]
        out: PathBuf,

        #[arg(long, default_value_t = false)]
        pretty: bool,
    },

    /// Run repeated reductions over a dataset and emit an experiment report (JSON).
    Experiment {
        /// Dataset produced by `sumlab generate`
        #[arg(long)]
        data: PathBuf,

        /// Distribution receipt; required with --regenerate
        #[arg(long)]
        distribution: Option<PathBuf>,

        /// add | multiply | matmul
        #[arg(long, default_value = "add")]
        operation: Operation,

        #[arg(long, default_value_t = 10)]
        trials: u32,

        /// Algorithms to run, comma separated (default: all)
        #[arg(long = "algorithm", value_delimiter = ',')]
        algorithms: Vec<Algorithm>,

        /// Draw a fresh dataset each trial instead of shuffling
        #[arg(long, default_value_t = false)]
        regenerate: bool,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value = "sumlab-report.json")]
        out: PathBuf,

        #[arg(long, default_value_t = false)]
        pretty: bool,
    },

    /// Export report records as CSV or JSONL.
    Export {
        #[arg(long)]
        report: PathBuf,

        /// csv | jsonl
        #[arg(long, default_value = "csv")]
        format: ExportFormat,

        /// Output path (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Build, generate, and experiment in one go from a TOML config.
    Run {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> ExitCode {
    if let Err(err) = real_main() {
        eprintln!("{err:#}");
        if is_busy(&err) {
            return ExitCode::from(4);
        }
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let coordinator = RunCoordinator::new();

    match cli.cmd {
        Command::Distribution {
            spec,
            bins,
            lower,
            upper,
            out,
            pretty,
        } => {
            let req = DistributionRequest {
                spec,
                bins,
                lower,
                upper,
            };
            let outcome = run_job(&coordinator, "distribution", move |progress| {
                DistributionUseCase::new(tool_info()).execute(&req, progress)
            })?;
            write_json(&out, &outcome.receipt, pretty)
        }

        Command::Generate {
            distribution,
            count,
            matrix_size,
            seed,
            out,
            pretty,
        } => {
            let receipt: DistributionReceipt = read_json(&distribution)?;
            let distribution = distribution_from_receipt(&receipt)
                .with_context(|| format!("invalid distribution receipt {}", distribution.display()))?;
            let req = GenerateRequest {
                kind: if matrix_size.is_some() {
                    DataKind::Matrix
                } else {
                    DataKind::Array
                },
                count,
                matrix_size,
            };
            let mut rng = seeded_rng(seed);

            let file = run_job(&coordinator, "generate", move |progress| {
                GenerateUseCase::new(tool_info()).execute(&distribution, &req, &mut rng, progress)
            })?;
            write_json(&out, &file, pretty)
        }

        Command::Experiment {
            data,
            distribution,
            operation,
            trials,
            algorithms,
            regenerate,
            seed,
            out,
            pretty,
        } => {
            let dataset: DatasetFile = read_json(&data)?;
            let distribution = match distribution {
                Some(path) => {
                    let receipt: DistributionReceipt = read_json(&path)?;
                    Some(
                        distribution_from_receipt(&receipt)
                            .with_context(|| format!("invalid distribution receipt {}", path.display()))?,
                    )
                }
                None => None,
            };
            let req = ExperimentRequest {
                spec: ExperimentSpec {
                    operation,
                    trials,
                    algorithms: if algorithms.is_empty() {
                        Algorithm::ALL.to_vec()
                    } else {
                        algorithms
                    },
                    mode: ExperimentMode::from_regenerate_flag(regenerate),
                },
                dataset: dataset.data,
                distribution,
            };
            let mut rng = seeded_rng(seed);

            let report = run_job(&coordinator, "experiment", move |progress| {
                ExperimentUseCase::new(SystemClock, tool_info()).execute(req, &mut rng, progress)
            })?;
            write_json(&out, &report, pretty)
        }

        Command::Export {
            report,
            format,
            out,
        } => {
            let report: ExperimentReport = read_json(&report)?;
            let content = ExportUseCase::export_report(&report, format)?;

            match out {
                Some(path) => {
                    ensure_parent(&path)?;
                    atomic_write(&path, content.as_bytes())?;
                }
                None => {
                    print!("{content}");
                }
            }
            Ok(())
        }

        Command::Run { config, seed } => {
            let cfg = read_toml(&config)?;
            validate_config(&cfg).with_context(|| format!("invalid config {}", config.display()))?;
            run_pipeline(&coordinator, cfg, seed)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "sumlab".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    let seed = seed.unwrap_or_else(rand::random);
    info!(seed, "rng seeded");
    StdRng::seed_from_u64(seed)
}

fn is_busy(err: &anyhow::Error) -> bool {
    err.chain().any(|e| {
        e.is::<ResourceBusy>() || matches!(e.downcast_ref::<CoordinatorError>(), Some(CoordinatorError::Busy(_)))
    })
}

/// Run `job` on a worker thread holding the coordinator's slot.
fn run_job<T, F>(coordinator: &RunCoordinator, name: &str, job: F) -> anyhow::Result<T>
where
    F: FnOnce(&ChannelProgress) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = coordinator.try_submit(name, job)?;
    handle.wait(|percent| debug!(job = name, percent, "progress"))?
}

/// Check everything a config can get wrong before any work starts.
fn validate_config(cfg: &ConfigFile) -> anyhow::Result<()> {
    let d = &cfg.distribution;
    valid_params(d.bins, d.lower, d.upper)?;

    if cfg.data.count <= 0 {
        return Err(SamplingError::InvalidCount(cfg.data.count).into());
    }
    if cfg.data.kind == DataKind::Matrix {
        match cfg.data.matrix_size {
            Some(m) if m > 0 => {}
            other => return Err(SamplingError::InvalidDimension(other.unwrap_or(0)).into()),
        }
    }

    let e = &cfg.experiment;
    if e.trials == 0 {
        return Err(RequestError::ZeroTrials.into());
    }
    if e.algorithms.is_empty() {
        return Err(RequestError::NoAlgorithms.into());
    }
    Ok(())
}

fn run_pipeline(coordinator: &RunCoordinator, cfg: ConfigFile, seed: Option<u64>) -> anyhow::Result<()> {
    let out_dir = PathBuf::from(&cfg.output.dir);
    let pretty = cfg.output.pretty;
    let mut rng = seeded_rng(seed);

    let (receipt, dataset, report) = run_job(coordinator, "run", move |progress| {
        let tool = tool_info();

        let outcome = DistributionUseCase::new(tool.clone()).execute(
            &DistributionRequest {
                spec: cfg.distribution.spec.clone(),
                bins: cfg.distribution.bins,
                lower: cfg.distribution.lower,
                upper: cfg.distribution.upper,
            },
            progress,
        )?;

        let dataset = GenerateUseCase::new(tool.clone()).execute(
            &outcome.distribution,
            &GenerateRequest {
                kind: cfg.data.kind,
                count: cfg.data.count,
                matrix_size: cfg.data.matrix_size,
            },
            &mut rng,
            progress,
        )?;

        let report = ExperimentUseCase::new(SystemClock, tool).execute(
            ExperimentRequest {
                spec: ExperimentSpec {
                    operation: cfg.experiment.operation,
                    trials: cfg.experiment.trials,
                    algorithms: cfg.experiment.algorithms.clone(),
                    mode: cfg.experiment.mode,
                },
                dataset: dataset.data.clone(),
                distribution: Some(outcome.distribution),
            },
            &mut rng,
            progress,
        )?;

        Ok((outcome.receipt, dataset, report))
    })?;

    write_json(&out_dir.join("distribution.json"), &receipt, pretty)?;
    write_json(&out_dir.join("dataset.json"), &dataset, pretty)?;
    write_json(&out_dir.join("report.json"), &report, pretty)?;

    let csv = ExportUseCase::export_report(&report, ExportFormat::Csv)?;
    atomic_write(&out_dir.join("report.csv"), csv.as_bytes())?;

    info!(dir = %out_dir.display(), records = report.records.len(), "run artifacts written");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let bytes = fs::read(path)
        .map_err(SumlabError::from)
        .with_context(|| format!("read {}", path.display()))?;
    let v = serde_json::from_slice(&bytes)
        .map_err(SumlabError::from)
        .with_context(|| format!("parse json {}", path.display()))?;
    Ok(v)
}

fn read_toml(path: &Path) -> anyhow::Result<ConfigFile> {
    let text = fs::read_to_string(path)
        .map_err(SumlabError::from)
        .with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str(&text)
        .map_err(SumlabError::from)
        .with_context(|| format!("parse toml {}", path.display()))?;
    Ok(cfg)
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
        }
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T, pretty: bool) -> anyhow::Result<()> {
    ensure_parent(path)?;

    let bytes = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };

    atomic_write(path, &bytes)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    use std::io::Write;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = parent.to_path_buf();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4()));

    {
        let mut f = fs::File::create(&tmp).with_context(|| format!("create temp {}", tmp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("write temp {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path).with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sumlab_error::ErrorKind;
    use tempfile::tempdir;

    fn kind_of(err: &anyhow::Error) -> Option<ErrorKind> {
        err.downcast_ref::<SumlabError>().map(SumlabError::kind)
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = read_json::<DatasetFile>(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::Io));
        assert!(format!("{err:#}").contains("absent.json"));

        let err = read_toml(&dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::Io));
    }

    #[test]
    fn malformed_json_and_toml_keep_their_source() {
        let dir = tempdir().unwrap();
        let json = dir.path().join("bad.json");
        fs::write(&json, b"{ not json").unwrap();
        let err = read_json::<DatasetFile>(&json).unwrap_err();
        assert!(matches!(err.downcast_ref::<SumlabError>(), Some(SumlabError::Json(_))));

        let toml = dir.path().join("bad.toml");
        fs::write(&toml, "[distribution\nspec = ").unwrap();
        let err = read_toml(&toml).unwrap_err();
        assert!(matches!(err.downcast_ref::<SumlabError>(), Some(SumlabError::Toml(_))));
    }

    #[test]
    fn json_round_trips_through_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        let value = serde_json::json!({ "value": "inf", "count": 3 });
        write_json(&path, &value, true).unwrap();
        let back: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(back, value);
    }
}
