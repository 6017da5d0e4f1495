// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    anyhow::{Context, Result},
    apple_flat_package::{extract_metadata, PkgMetadata},
    apple_xar::{
        signature::{check_signature, SignatureStatus},
        source::buffer_reader,
    },
    clap::{Arg, ArgAction, ArgMatches, Command},
    log::{info, LevelFilter},
    std::{
        fs::File,
        io::{Cursor, Write},
        path::PathBuf,
    },
};

const ABOUT: &str = "\
# About

`pkg-inspect` reports metadata about Apple flat packages (`.pkg` files).

Product packages are described by their `Distribution` file. Component
packages are described by their `PackageInfo` file. Nothing in the package
is installed or executed.

Signatures are only detected, never verified.
";

/// Where package bytes come from.
enum Input {
    Path(PathBuf),
    Stdin(Cursor<Vec<u8>>),
}

impl Input {
    fn resolve(path: &str) -> Result<Self> {
        if path == "-" {
            let data = buffer_reader(std::io::stdin())
                .context("reading package from stdin")?;

            Ok(Self::Stdin(data))
        } else {
            Ok(Self::Path(PathBuf::from(path)))
        }
    }

    fn metadata(&self) -> Result<PkgMetadata> {
        match self {
            Self::Path(path) => {
                let fh = File::open(path)
                    .with_context(|| format!("opening {}", path.display()))?;
                extract_metadata(fh)
                    .with_context(|| format!("extracting metadata from {}", path.display()))
            }
            Self::Stdin(data) => {
                extract_metadata(Cursor::new(data.get_ref().as_slice()))
                    .context("extracting metadata")
            }
        }
    }

    fn signature_status(&self) -> Result<SignatureStatus, String> {
        let res = match self {
            Self::Path(path) => {
                let fh = File::open(path).map_err(|e| e.to_string())?;
                check_signature(fh)
            }
            Self::Stdin(data) => check_signature(data.get_ref().as_slice()),
        };

        res.map_err(|e| e.to_string())
    }
}

fn write_digest(
    writer: &mut impl Write,
    label: &str,
    digest: &Option<Vec<u8>>,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "{}: {}",
        label,
        digest.as_deref().map(base64::encode).unwrap_or_default()
    )
}

/// Write a human readable report of package metadata.
pub fn write_report(writer: &mut impl Write, metadata: &PkgMetadata) -> std::io::Result<()> {
    writeln!(writer)?;
    writeln!(writer, "Package Analysis Report")?;
    writeln!(writer, "=======================")?;
    writeln!(writer)?;
    writeln!(writer, "Main Package")?;
    writeln!(writer, "------------")?;
    writeln!(writer, "Name: {}", metadata.application_title)?;
    writeln!(writer, "Display Name: {}", metadata.display_name)?;
    writeln!(writer, "Bundle Name: {}", metadata.bundle_name)?;
    writeln!(writer, "Version: {}", metadata.version)?;
    writeln!(writer, "Flavor: {}", metadata.flavor)?;
    writeln!(
        writer,
        "Primary Bundle Identifier: {}",
        metadata.primary_bundle_identifier
    )?;
    writeln!(
        writer,
        "Minimum supported macOS Version: {}",
        metadata.minimum_os_version
    )?;
    writeln!(writer, "Package IDs: [{}]", metadata.package_ids.join(" "))?;
    writeln!(
        writer,
        "Supported Architecture(s): {}",
        metadata.host_architectures
    )?;
    writeln!(writer, "Primary Bundle Path: {}", metadata.primary_bundle_path)?;
    writeln!(writer, "Signed: {}", metadata.is_signed)?;
    writeln!(writer, "PKG Size in MB: {:.2}", metadata.size_mb)?;
    write_digest(writer, "SHA256", &metadata.sha256)?;
    write_digest(writer, "MD5", &metadata.md5)?;
    write_digest(writer, "SHA1", &metadata.sha1)?;

    if !metadata.app_bundles.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "App Bundles")?;
        writeln!(writer, "-----------")?;

        for (i, bundle) in metadata.app_bundles.iter().enumerate() {
            writeln!(writer, "Bundle {}:", i + 1)?;
            writeln!(writer, "  App Bundle ID: {}", bundle.id)?;
            writeln!(
                writer,
                "  CFBundleShortVersionString: {}",
                bundle.short_version
            )?;
            writeln!(writer, "  App Location Path: {}", bundle.install_path)?;
        }
    }

    Ok(())
}

/// Write the outcome of signature detection.
pub fn write_signature_status(
    writer: &mut impl Write,
    status: Result<SignatureStatus, String>,
) -> std::io::Result<()> {
    writeln!(writer)?;
    writeln!(writer, "Signature Check")?;
    writeln!(writer, "---------------")?;

    match status {
        Ok(SignatureStatus::Signed) => writeln!(writer, "Status: Signed"),
        Ok(SignatureStatus::NotSigned) => writeln!(writer, "Status: Not signed"),
        Ok(SignatureStatus::InvalidType) => writeln!(writer, "Status: Invalid XAR package"),
        Err(e) => writeln!(writer, "Status: Error checking signature: {}", e),
    }
}

fn command_inspect(args: &ArgMatches) -> Result<()> {
    let path = args
        .get_one::<String>("path")
        .context("package path is required")?;

    let input = Input::resolve(path)?;
    let metadata = input.metadata()?;
    info!("extracted metadata from {}", path);

    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();

    if args.get_flag("json") {
        serde_json::to_writer_pretty(&mut stdout, &metadata)?;
        writeln!(stdout)?;
    } else {
        write_report(&mut stdout, &metadata)?;
    }

    if args.get_flag("check_signature") {
        write_signature_status(&mut stdout, input.signature_status())?;
    }

    Ok(())
}

fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();
}

fn app() -> Command {
    Command::new("Apple flat package inspector")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Inspect metadata of Apple flat packages")
        .long_about(ABOUT)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("Increase logging verbosity. Can be specified multiple times"),
        )
        .arg(
            Arg::new("check_signature")
                .long("check-signature")
                .action(ArgAction::SetTrue)
                .help("Also report whether the package carries a signature"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print metadata as JSON"),
        )
        .arg(
            Arg::new("path")
                .required(true)
                .help("Path to .pkg file to inspect. `-` reads from stdin"),
        )
}

pub fn run() -> Result<()> {
    let matches = app().get_matches();

    init_logging(matches.get_count("verbose"));

    command_inspect(&matches)
}
