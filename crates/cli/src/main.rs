#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

mod telemetry;

use std::error::Error as _;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use certflow_issuance::{
    CertificateOptions, HttpConnector, IssuanceError, KeyFileIssuer, Orchestrator, Settings,
    StorageOutcome,
};

use crate::telemetry::TelemetryError;

const DEFAULT_PROVISIONER: &str = "certflow";

#[derive(Parser)]
#[command(
    name = "certflow",
    version,
    about = "Request and sign X.509 certificates against a certificate authority"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair and obtain a certificate for it
    Certificate(CertificateArgs),
    /// Obtain a certificate for an existing certificate signing request
    Sign(SignArgs),
}

#[derive(Args)]
struct CertificateArgs {
    /// Common name of the certificate; also its only SAN unless --san or the token says otherwise
    subject: String,
    /// Output certificate chain (leaf then issuer)
    crt_file: PathBuf,
    /// Output private key
    key_file: PathBuf,
    #[command(flatten)]
    common: CommonArgs,
    /// Sign with a local authority instead of contacting the CA
    #[arg(long)]
    offline: bool,
    /// Authority configuration used by --offline
    #[arg(long = "ca-config", value_name = "FILE")]
    ca_config: Option<PathBuf>,
}

#[derive(Args)]
struct SignArgs {
    /// PEM certificate signing request
    csr_file: PathBuf,
    /// Output certificate chain (leaf then issuer)
    crt_file: PathBuf,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct CommonArgs {
    /// One-time token authorizing the request
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,
    /// Authority URL
    #[arg(long = "ca-url", value_name = "URI", env = "CERTFLOW_CA_URL")]
    ca_url: Option<String>,
    /// Root certificate used to authenticate the authority
    #[arg(long, value_name = "FILE", env = "CERTFLOW_ROOT")]
    root: Option<PathBuf>,
    /// Start of validity: RFC 3339 time or duration from now (e.g. 5m)
    #[arg(long = "not-before", value_name = "TIME|DURATION")]
    not_before: Option<String>,
    /// End of validity: RFC 3339 time or duration from now (e.g. 24h)
    #[arg(long = "not-after", value_name = "TIME|DURATION")]
    not_after: Option<String>,
    /// DNS name, IP address, e-mail or URI to include; repeatable. Not allowed with --token
    #[arg(long = "san", value_name = "NAME")]
    sans: Vec<String>,
    /// Overwrite existing output files
    #[arg(long)]
    force: bool,
    /// Provisioner name written into issued tokens
    #[arg(long, value_name = "NAME", requires = "provisioner_key")]
    provisioner: Option<String>,
    /// Ed25519 PKCS#8 key used to issue a token when --token is absent
    #[arg(long = "provisioner-key", value_name = "FILE")]
    provisioner_key: Option<PathBuf>,
}

impl CommonArgs {
    fn into_options(self, settings: &Settings) -> CertificateOptions {
        CertificateOptions {
            token: self.token,
            sans: self.sans,
            not_before: self.not_before,
            not_after: self.not_after,
            authority: settings.authority_options(self.ca_url, self.root),
            offline: false,
            ca_config: None,
            force: self.force,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Issuance(#[from] IssuanceError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

type CliResult<T> = Result<T, CliError>;

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        let mut cursor = err.source();
        while let Some(cause) = cursor {
            eprintln!("  caused by: {cause}");
            cursor = cause.source();
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    telemetry::init_tracing()?;
    let settings = Settings::from_env()?;
    match cli.command {
        Commands::Certificate(args) => handle_certificate(args, &settings),
        Commands::Sign(args) => handle_sign(args, &settings),
    }
}

fn handle_certificate(args: CertificateArgs, settings: &Settings) -> CliResult<()> {
    let orchestrator = orchestrator(&args.common, settings)?;
    let mut options = args.common.into_options(settings);
    options.offline = args.offline;
    options.ca_config = args.ca_config;
    let outcome =
        orchestrator.new_certificate(&args.subject, &args.crt_file, &args.key_file, &options)?;
    report(&outcome);
    Ok(())
}

fn handle_sign(args: SignArgs, settings: &Settings) -> CliResult<()> {
    let orchestrator = orchestrator(&args.common, settings)?;
    let options = args.common.into_options(settings);
    let outcome = orchestrator.sign_certificate(&args.csr_file, &args.crt_file, &options)?;
    report(&outcome);
    Ok(())
}

fn orchestrator(common: &CommonArgs, settings: &Settings) -> CliResult<Orchestrator<HttpConnector>> {
    let orchestrator = Orchestrator::new(settings.connector());
    let Some(key) = &common.provisioner_key else {
        return Ok(orchestrator);
    };
    let name = common
        .provisioner
        .clone()
        .unwrap_or_else(|| DEFAULT_PROVISIONER.to_owned());
    let issuer = KeyFileIssuer::from_pem_file(name, key)?;
    Ok(orchestrator.with_issuer(Box::new(issuer)))
}

fn report(outcome: &StorageOutcome) {
    println!("✔ Certificate: {}", outcome.certificate_path.display());
    if let Some(key) = &outcome.private_key_path {
        println!("✔ Private Key: {}", key.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sans_are_repeatable() {
        let cli = Cli::try_parse_from([
            "certflow",
            "certificate",
            "foobar",
            "foo.crt",
            "foo.key",
            "--san",
            "1.1.1.1",
            "--san",
            "hello.example.com",
            "--not-after",
            "1h",
        ])
        .expect("parse");
        let Commands::Certificate(args) = cli.command else {
            panic!("expected certificate command");
        };
        assert_eq!(args.common.sans, ["1.1.1.1", "hello.example.com"]);
        assert_eq!(args.common.not_after.as_deref(), Some("1h"));
        assert!(!args.offline);
    }

    #[test]
    fn provisioner_name_needs_a_key() {
        assert!(Cli::try_parse_from([
            "certflow",
            "sign",
            "a.csr",
            "a.crt",
            "--provisioner",
            "admin",
        ])
        .is_err());
    }
}
