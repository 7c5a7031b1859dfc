// crates/certledger-cli/src/main.rs
// ============================================================================
// Module: Certledger CLI Entry Point
// Description: Command dispatcher for range, counter, and record administration.
// Purpose: Provide a safe, catalog-backed CLI over a shared CA directory.
// Dependencies: clap, certledger-cli, certledger-config, certledger-core,
//               serde_jcs, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The `certledger` binary administers one replica's view of the shared
//! directory: counter ranges and modes, certificate and request records, and
//! bulk imports. Every successful command writes one canonical JSON document
//! to stdout. Failures exit with status 1 and print `kind: message` on stderr,
//! where `kind` is the error taxonomy label.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use certledger_cli::context::ContextError;
use certledger_cli::context::ReplicaContext;
use certledger_cli::t;
use certledger_config::CertledgerConfig;
use certledger_config::ConfigError;
use certledger_core::AllocationError;
use certledger_core::CertificateFilter;
use certledger_core::CertificateRecord;
use certledger_core::CertificateStatus;
use certledger_core::GeneratorMode;
use certledger_core::PageRequest;
use certledger_core::RepositoryError;
use certledger_core::RequestId;
use certledger_core::RequestRecord;
use certledger_core::RequestStatusFilter;
use certledger_core::RequestType;
use certledger_core::RevocationReason;
use certledger_core::SerialNumber;
use certledger_core::SortOrder;
use certledger_core::Timestamp;
use certledger_core::runtime::DEFAULT_PAGE_LIMIT;
use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of an import file.
const MAX_IMPORT_BYTES: usize = 64 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "certledger", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Config file path (defaults to `CERTLEDGER_CONFIG`, then certledger.toml).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Range lease inspection and administration.
    Range {
        /// Selected range subcommand.
        #[command(subcommand)]
        command: RangeCommand,
    },
    /// Counter administration.
    Counter {
        /// Selected counter subcommand.
        #[command(subcommand)]
        command: CounterCommand,
    },
    /// Certificate record administration.
    Cert {
        /// Selected certificate subcommand.
        #[command(subcommand)]
        command: CertCommand,
    },
    /// Request record inspection.
    Request {
        /// Selected request subcommand.
        #[command(subcommand)]
        command: RequestCommand,
    },
    /// Bulk import of existing records.
    Import(ImportCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Range subcommands.
#[derive(Subcommand, Debug)]
enum RangeCommand {
    /// Show the counter's mode, pointer, and replica leases.
    Show(CounterArg),
    /// Lease a fresh range for this replica.
    Lease(RangeLeaseCommand),
    /// Release this replica's active lease.
    Release(CounterArg),
}

/// Counter subcommands.
#[derive(Subcommand, Debug)]
enum CounterCommand {
    /// Change the counter's persisted generator mode.
    Migrate(CounterMigrateCommand),
}

/// Certificate subcommands.
#[derive(Subcommand, Debug)]
enum CertCommand {
    /// List certificates matching a filter.
    Find(CertFindCommand),
    /// Show one certificate.
    Show(SerialArg),
    /// Revoke a certificate.
    Revoke(CertRevokeCommand),
    /// Release a certificate hold.
    ReleaseHold(SerialArg),
    /// Expire every certificate whose validity has ended.
    Expire(CertExpireCommand),
}

/// Request subcommands.
#[derive(Subcommand, Debug)]
enum RequestCommand {
    /// List requests by status or type.
    Find(RequestFindCommand),
    /// Show one request.
    Show(RequestIdArg),
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate the config file and print the effective configuration.
    Validate,
}

/// Counter selection.
#[derive(Args, Debug)]
struct CounterArg {
    /// Counter name (`serialNumber` or `requestNumber`).
    #[arg(long, value_name = "NAME", default_value = "serialNumber")]
    counter: String,
}

/// Arguments for leasing a range.
#[derive(Args, Debug)]
struct RangeLeaseCommand {
    /// Counter selection.
    #[command(flatten)]
    counter: CounterArg,
    /// Range size (defaults to the configured size).
    #[arg(long, value_name = "N")]
    size: Option<u64>,
}

/// Arguments for counter migration.
#[derive(Args, Debug)]
struct CounterMigrateCommand {
    /// Counter selection.
    #[command(flatten)]
    counter: CounterArg,
    /// Target generator mode (`legacy`, `legacy2`, or `random`).
    #[arg(long, value_name = "MODE")]
    mode: String,
}

/// Certificate serial argument.
#[derive(Args, Debug)]
struct SerialArg {
    /// Serial number, decimal or `0x` hex.
    #[arg(value_name = "SERIAL")]
    serial: String,
}

/// Request identifier argument.
#[derive(Args, Debug)]
struct RequestIdArg {
    /// Request identifier, decimal or `0x` hex.
    #[arg(value_name = "ID")]
    id: String,
}

/// Paging and ordering arguments.
#[derive(Args, Debug)]
struct PageArgs {
    /// Sort order by identifier.
    #[arg(long, value_enum, default_value_t = OrderArg::Asc)]
    order: OrderArg,
    /// Matches to skip.
    #[arg(long, default_value_t = 0)]
    offset: usize,
    /// Maximum matches to return.
    #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
    limit: usize,
}

impl PageArgs {
    /// Returns the core sort order.
    const fn sort(&self) -> SortOrder {
        match self.order {
            OrderArg::Asc => SortOrder::Ascending,
            OrderArg::Desc => SortOrder::Descending,
        }
    }

    /// Returns the core page request.
    const fn page(&self) -> PageRequest {
        PageRequest {
            offset: self.offset,
            limit: self.limit,
        }
    }
}

/// Sort order selection.
#[derive(ValueEnum, Copy, Clone, Debug)]
enum OrderArg {
    /// Lowest identifier first.
    Asc,
    /// Highest identifier first.
    Desc,
}

/// Arguments for certificate listings.
#[derive(Args, Debug)]
struct CertFindCommand {
    /// Required status (`VALID`, `REVOKED`, `EXPIRED`, `REVOKED_EXPIRED`).
    #[arg(long, value_name = "STATUS")]
    status: Option<String>,
    /// Lowest serial number (inclusive).
    #[arg(long, value_name = "SERIAL")]
    serial_from: Option<String>,
    /// Highest serial number (inclusive).
    #[arg(long, value_name = "SERIAL")]
    serial_to: Option<String>,
    /// Earliest validity start (RFC 3339 or unix milliseconds).
    #[arg(long, value_name = "TIME")]
    issued_from: Option<String>,
    /// Latest validity start (RFC 3339 or unix milliseconds).
    #[arg(long, value_name = "TIME")]
    issued_to: Option<String>,
    /// Earliest validity end (RFC 3339 or unix milliseconds).
    #[arg(long, value_name = "TIME")]
    expires_from: Option<String>,
    /// Latest validity end (RFC 3339 or unix milliseconds).
    #[arg(long, value_name = "TIME")]
    expires_to: Option<String>,
    /// Paging and ordering.
    #[command(flatten)]
    page: PageArgs,
}

/// Arguments for certificate revocation.
#[derive(Args, Debug)]
struct CertRevokeCommand {
    /// Serial number, decimal or `0x` hex.
    #[arg(value_name = "SERIAL")]
    serial: String,
    /// Reason label (e.g. `key-compromise`) or RFC 5280 code.
    #[arg(long, value_name = "REASON")]
    reason: String,
    /// Effective revocation date (defaults to now).
    #[arg(long, value_name = "TIME")]
    date: Option<String>,
}

/// Arguments for the expiry sweep.
#[derive(Args, Debug)]
struct CertExpireCommand {
    /// Sweep time (defaults to now).
    #[arg(long, value_name = "TIME")]
    now: Option<String>,
}

/// Arguments for request listings.
#[derive(Args, Debug)]
struct RequestFindCommand {
    /// Status filter (`pending`, `complete`, `rejected`, `canceled`, or `all`).
    #[arg(long, value_name = "STATUS", default_value = "all", conflicts_with = "request_type")]
    status: String,
    /// Request type filter.
    #[arg(long = "type", value_name = "TYPE")]
    request_type: Option<String>,
    /// Paging and ordering.
    #[command(flatten)]
    page: PageArgs,
}

/// Arguments for bulk import.
#[derive(Args, Debug)]
struct ImportCommand {
    /// JSON array of certificate records.
    #[arg(long, value_name = "PATH")]
    certificates: Option<PathBuf>,
    /// JSON array of request records.
    #[arg(long, value_name = "PATH")]
    requests: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying a taxonomy label and a catalog message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Stable taxonomy label.
    kind: &'static str,
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(kind: &'static str, message: String) -> Self {
        Self {
            kind,
            message,
        }
    }

    /// Constructs an argument validation error.
    const fn argument(message: String) -> Self {
        Self::new("invalid_argument", message)
    }
}

impl From<ContextError> for CliError {
    fn from(err: ContextError) -> Self {
        let message = match &err {
            ContextError::Config(_) => t!("config.load_failed", error = err),
            ContextError::Store(_) => t!("store.open_failed", error = err),
            ContextError::Audit {
                path,
                message,
            } => t!("audit.open_failed", path = path, error = message),
            ContextError::Allocation(_) => err.to_string(),
        };
        Self::new(err.kind(), message)
    }
}

impl From<AllocationError> for CliError {
    fn from(err: AllocationError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<RepositoryError> for CliError {
    fn from(err: RepositoryError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| output_error("stdout", &err))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let config = load_config(cli.config.as_deref())?;
    if let Commands::Config {
        command: ConfigCommand::Validate,
    } = command
    {
        let effective = config.to_json().map_err(|err| {
            CliError::new(err.kind(), t!("output.serialize_failed", error = err))
        })?;
        write_json_value(&json!({ "status": "valid", "config": effective }))?;
        return Ok(ExitCode::SUCCESS);
    }

    let context = ReplicaContext::open(config)?;
    let output = match command {
        Commands::Range {
            command,
        } => command_range(&context, command)?,
        Commands::Counter {
            command,
        } => command_counter(&context, command)?,
        Commands::Cert {
            command,
        } => command_cert(&context, command)?,
        Commands::Request {
            command,
        } => command_request(&context, command)?,
        Commands::Import(command) => command_import(&context, &command)?,
        Commands::Config {
            ..
        } => Value::Null,
    };
    write_json_value(&output)?;
    Ok(ExitCode::SUCCESS)
}

/// Loads and validates configuration.
fn load_config(path: Option<&Path>) -> CliResult<CertledgerConfig> {
    CertledgerConfig::load(path)
        .map_err(|err| CliError::new(err.kind(), t!("config.load_failed", error = err)))
}

/// Prints CLI help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| output_error("stdout", &err))?;
    write_stdout_line("").map_err(|err| output_error("stdout", &err))?;
    Ok(())
}

// ============================================================================
// SECTION: Range and Counter Commands
// ============================================================================

/// Dispatches range subcommands.
fn command_range(context: &ReplicaContext, command: RangeCommand) -> CliResult<Value> {
    let ranges = context.ranges();
    let replica = context.config().replica_id();
    match command {
        RangeCommand::Show(arg) => {
            let counter = context.counter(&arg.counter)?;
            to_value(&ranges.counter_info(&counter)?)
        }
        RangeCommand::Lease(command) => {
            let generator = context.generator(&command.counter.counter)?;
            let settings = context.config().settings_for(&command.counter.counter).map_err(
                |err: ConfigError| CliError::new(err.kind(), err.to_string()),
            )?;
            let size = command.size.map_or(settings.range_size, u128::from);
            let lease = ranges.lease_new_range(&replica, generator.counter(), size)?;
            to_value(&lease)
        }
        RangeCommand::Release(arg) => {
            let counter = context.counter(&arg.counter)?;
            match ranges.release_range(&replica, &counter)? {
                Some(lease) => to_value(&lease),
                None => Ok(json!({
                    "counter": counter.as_str(),
                    "replica": replica.as_str(),
                    "released": Value::Null,
                    "note": t!("range.release.none"),
                })),
            }
        }
    }
}

/// Dispatches counter subcommands.
fn command_counter(context: &ReplicaContext, command: CounterCommand) -> CliResult<Value> {
    match command {
        CounterCommand::Migrate(command) => {
            let mode: GeneratorMode = command
                .mode
                .parse()
                .map_err(|err: String| CliError::argument(t!("arg.invalid_mode", error = err)))?;
            let generator = context.generator(&command.counter.counter)?;
            let outcome = context.ranges().migrate_mode(generator.counter(), mode)?;
            Ok(json!({
                "counter": generator.counter().as_str(),
                "from": outcome.from,
                "to": outcome.to,
                "changed": !outcome.is_noop(),
            }))
        }
    }
}

// ============================================================================
// SECTION: Certificate Commands
// ============================================================================

/// Dispatches certificate subcommands.
fn command_cert(context: &ReplicaContext, command: CertCommand) -> CliResult<Value> {
    let certificates = context.certificates()?;
    match command {
        CertCommand::Find(command) => {
            let filter = certificate_filter(&command)?;
            to_value(&certificates.find(&filter, command.page.sort(), command.page.page())?)
        }
        CertCommand::Show(arg) => to_value(&certificates.read(parse_serial(&arg.serial)?)?),
        CertCommand::Revoke(command) => {
            let serial = parse_serial(&command.serial)?;
            let reason: RevocationReason = command
                .reason
                .parse()
                .map_err(|err: String| CliError::argument(t!("arg.invalid_reason", error = err)))?;
            let date = parse_optional_time(command.date.as_deref())?.unwrap_or_else(Timestamp::now);
            to_value(&certificates.revoke(serial, reason, date)?)
        }
        CertCommand::ReleaseHold(arg) => {
            to_value(&certificates.release_hold(parse_serial(&arg.serial)?)?)
        }
        CertCommand::Expire(command) => {
            let now = parse_optional_time(command.now.as_deref())?.unwrap_or_else(Timestamp::now);
            let expired = certificates.expire_due(now)?;
            Ok(json!({ "expired": expired, "count": expired.len() }))
        }
    }
}

/// Builds a certificate filter from command arguments.
fn certificate_filter(command: &CertFindCommand) -> CliResult<CertificateFilter> {
    let status = command
        .status
        .as_deref()
        .map(str::parse::<CertificateStatus>)
        .transpose()
        .map_err(|err| CliError::argument(t!("arg.invalid_status", error = err)))?;
    Ok(CertificateFilter {
        status,
        serial_from: command.serial_from.as_deref().map(parse_serial).transpose()?,
        serial_to: command.serial_to.as_deref().map(parse_serial).transpose()?,
        issued_from: parse_optional_time(command.issued_from.as_deref())?,
        issued_to: parse_optional_time(command.issued_to.as_deref())?,
        expires_from: parse_optional_time(command.expires_from.as_deref())?,
        expires_to: parse_optional_time(command.expires_to.as_deref())?,
    })
}

// ============================================================================
// SECTION: Request Commands
// ============================================================================

/// Dispatches request subcommands.
fn command_request(context: &ReplicaContext, command: RequestCommand) -> CliResult<Value> {
    let requests = context.requests()?;
    match command {
        RequestCommand::Find(command) => {
            let page = match command.request_type.as_deref() {
                Some(text) => {
                    let request_type: RequestType = text.parse().map_err(|err: String| {
                        CliError::argument(t!("arg.invalid_type", error = err))
                    })?;
                    requests.find_by_type(request_type, command.page.sort(), command.page.page())?
                }
                None => {
                    let status: RequestStatusFilter = command.status.parse().map_err(
                        |err: String| CliError::argument(t!("arg.invalid_status", error = err)),
                    )?;
                    requests.find_by_status(status, command.page.sort(), command.page.page())?
                }
            };
            to_value(&page)
        }
        RequestCommand::Show(arg) => {
            let id: RequestId = arg.id.parse::<RequestId>().map_err(|err| {
                CliError::argument(t!("arg.invalid_request_id", value = arg.id, error = err))
            })?;
            to_value(&requests.read(id)?)
        }
    }
}

// ============================================================================
// SECTION: Import Command
// ============================================================================

/// Imports certificate and request records.
fn command_import(context: &ReplicaContext, command: &ImportCommand) -> CliResult<Value> {
    if command.certificates.is_none() && command.requests.is_none() {
        return Err(CliError::argument(t!("input.none")));
    }
    let mut certificates_imported = 0_usize;
    let mut requests_imported = 0_usize;
    if let Some(path) = &command.certificates {
        let records: Vec<CertificateRecord> =
            read_import_json(path, &t!("input.kind.certificates"))?;
        let repository = context.certificates()?;
        for record in &records {
            repository.import(record)?;
            certificates_imported += 1;
        }
    }
    if let Some(path) = &command.requests {
        let records: Vec<RequestRecord> = read_import_json(path, &t!("input.kind.requests"))?;
        let repository = context.requests()?;
        for record in &records {
            repository.import(record)?;
            requests_imported += 1;
        }
    }
    Ok(json!({
        "certificates_imported": certificates_imported,
        "requests_imported": requests_imported,
    }))
}

/// Errors returned by bounded file reads.
#[derive(Debug)]
enum ReadLimitError {
    /// File I/O failure.
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let metadata = file.metadata().map_err(ReadLimitError::Io)?;
    let size = metadata.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        let actual = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        return Err(ReadLimitError::TooLarge {
            size: actual,
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Reads a bounded JSON import file.
fn read_import_json<T: DeserializeOwned>(path: &Path, kind: &str) -> CliResult<T> {
    let bytes = read_bytes_with_limit(path, MAX_IMPORT_BYTES).map_err(|err| match err {
        ReadLimitError::Io(error) => CliError::new(
            "input_unreadable",
            t!("input.read_failed", kind = kind, path = path.display(), error = error),
        ),
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(
            "input_too_large",
            t!(
                "input.read_too_large",
                kind = kind,
                path = path.display(),
                size = size,
                limit = limit
            ),
        ),
    })?;
    serde_json::from_slice(&bytes).map_err(|err| {
        CliError::new(
            "input_invalid",
            t!("input.parse_failed", kind = kind, path = path.display(), error = err),
        )
    })
}

// ============================================================================
// SECTION: Argument Helpers
// ============================================================================

/// Parses a serial number argument.
fn parse_serial(text: &str) -> CliResult<SerialNumber> {
    text.parse::<SerialNumber>().map_err(|err| {
        CliError::argument(t!("arg.invalid_serial", value = text, error = err))
    })
}

/// Parses an optional timestamp argument.
fn parse_optional_time(text: Option<&str>) -> CliResult<Option<Timestamp>> {
    text.map(|value| {
        Timestamp::parse(value).map_err(|err| {
            CliError::argument(t!("arg.invalid_timestamp", value = value, error = err))
        })
    })
    .transpose()
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Serializes a value to JSON.
fn to_value<T: Serialize>(value: &T) -> CliResult<Value> {
    serde_json::to_value(value).map_err(|err| {
        CliError::new("output_failed", t!("output.serialize_failed", error = err))
    })
}

/// Writes canonical JSON and a trailing newline to stdout.
fn write_json_value(value: &Value) -> CliResult<()> {
    let mut bytes = serde_jcs::to_vec(value).map_err(|err| {
        CliError::new("output_failed", t!("output.serialize_failed", error = err))
    })?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| output_error("stdout", &err))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream failure.
fn output_error(stream: &str, error: &std::io::Error) -> CliError {
    let stream_label = match stream {
        "stdout" => t!("output.stream.stdout"),
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.unknown"),
    };
    CliError::new("output_failed", t!("output.write_failed", stream = stream_label, error = error))
}

/// Emits an error line to stderr and returns a failure exit code.
fn emit_error(err: &CliError) -> ExitCode {
    let _ = write_stderr_line(&t!("error.line", kind = err.kind, message = err.message));
    ExitCode::FAILURE
}
