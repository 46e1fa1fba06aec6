use clap::{ArgAction, ArgGroup, Parser};
use log::{info, warn, LevelFilter};
use rawpack::archive::{self, PackOptions, UnpackOptions};
use rawpack::codec::directive::Directive;
use rawpack::pipeline::Compression;
use rawpack::probe::{self, IoProfile};
use rawpack::tuner::SystemProbe;
use rawpack::walk::{self, Glob, Selection};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "rpk",
    version,
    about = "Manipulate rawpack archives",
    after_help = "Patterns: `*` matches anything (including `/`), `?` one character.\n\
                  Examples:\n  \
                  rpk -cvf docs.rpk -d docs '*.md'\n  \
                  rpk -xvf docs.rpk -d out\n  \
                  rpk -c -z=l=high,t=4 -p secret -f - > backup.rpk"
)]
#[command(group(ArgGroup::new("mode").required(true).args(["list", "create", "extract"])))]
struct Cli {
    /// List archive contents
    #[arg(short, long)]
    list: bool,
    /// Create an archive
    #[arg(short, long)]
    create: bool,
    /// Extract an archive
    #[arg(short = 'x', long)]
    extract: bool,
    /// Archive file; `-` or absent means stdin/stdout
    #[arg(short, long, value_name = "NAME")]
    file: Option<String>,
    /// Base directory to pack from or extract into (created if missing)
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    dir: PathBuf,
    /// Leave out files matching this pattern
    #[arg(short, long, value_name = "PATTERN")]
    exclude: Vec<String>,
    /// Obfuscate with a password-derived keystream
    #[arg(short, long)]
    password: Option<String>,
    /// zstd compression: `auto` or `l=low|mid|high,t=N,m=N[%|G|M|K][B]`
    #[arg(
        short = 'z',
        long = "zstd",
        value_name = "DIRECTIVE",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "auto",
    )]
    zstd: Option<Directive>,
    /// The archive is not compressed; skip detection
    #[arg(long, conflicts_with = "zstd")]
    raw: bool,
    /// More output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Files to pack (default `*`)
    patterns: Vec<String>,
}

impl Cli {
    fn compression(&self) -> Compression {
        match (self.zstd, self.raw) {
            (Some(d), _)  => Compression::Zstd(d),
            (None, true)  => Compression::Off,
            (None, false) => Compression::Detect,
        }
    }

    /// `None` for stdio.
    fn archive_path(&self) -> Option<PathBuf> {
        match self.file.as_deref() {
            None | Some("-") => None,
            Some(name)       => Some(PathBuf::from(name)),
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rpk: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> rawpack::Result<()> {
    if cli.create {
        create(cli)
    } else {
        if !cli.patterns.is_empty() {
            warn!("patterns are only used when creating; ignoring {:?}", cli.patterns);
        }
        if cli.extract { extract(cli) } else { list(cli) }
    }
}

// ── Create ───────────────────────────────────────────────────────────────────

fn create(cli: &Cli) -> rawpack::Result<()> {
    let path = cli.archive_path();
    info!("creating archive {}", path.as_ref().map_or(String::from("<stdout>"), |p| p.display().to_string()));

    // Open the output first so the walk can recognise and skip it.
    let out: Box<dyn Write> = match &path {
        Some(p) => Box::new(File::create(p).map_err(|e| rawpack::Error::path(p, e))?),
        None    => Box::new(io::stdout().lock()),
    };

    archive::ensure_dir(&cli.dir)?;
    let include = if cli.patterns.is_empty() {
        vec![Glob::new("*")]
    } else {
        cli.patterns.iter().map(|p| Glob::new(p)).collect()
    };
    let sel = Selection {
        include,
        exclude: cli.exclude.iter().map(|p| Glob::new(p)).collect(),
        skip:    path.clone(),
    };
    let table = walk::collect(&cli.dir, &sel)?;

    let opts = PackOptions {
        password:    cli.password.clone(),
        compression: cli.compression(),
        io:          probe::measure(&cli.dir)?,
    };
    let size = archive::create(BufWriter::new(out), &cli.dir, &table, &opts, &SystemProbe)?;
    info!("packed {} files, {size} container bytes", table.len());
    Ok(())
}

// ── Extract / List ───────────────────────────────────────────────────────────

fn open_input(cli: &Cli) -> rawpack::Result<Box<dyn Read>> {
    Ok(match cli.archive_path() {
        Some(p) => Box::new(BufReader::new(File::open(&p).map_err(|e| rawpack::Error::path(&p, e))?)),
        None    => Box::new(io::stdin().lock()),
    })
}

fn extract(cli: &Cli) -> rawpack::Result<()> {
    archive::ensure_dir(&cli.dir)?;
    let opts = UnpackOptions {
        password:    cli.password.clone(),
        compression: cli.compression(),
        io:          probe::measure(&cli.dir)?,
    };
    let table = archive::extract(open_input(cli)?, &cli.dir, &opts, &SystemProbe)?;
    info!("unpacked {} files into {}", table.len(), cli.dir.display());
    Ok(())
}

fn list(cli: &Cli) -> rawpack::Result<()> {
    let opts = UnpackOptions {
        password:    cli.password.clone(),
        compression: cli.compression(),
        io:          IoProfile::default(),
    };
    let table = archive::list(open_input(cli)?, &opts, &SystemProbe)?;

    let mut out = io::stdout().lock();
    let n = table.len();
    for (i, r) in table.iter().enumerate() {
        if cli.verbose > 0 {
            writeln!(out, "{:3}/{:3}> {} ({} bytes)", i + 1, n, r.name, r.size)?;
        } else {
            writeln!(out, "{}", r.name)?;
        }
    }
    Ok(())
}
