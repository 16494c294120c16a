//! CLI validation tests for qdt client.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use qdt_client::cli::{Cli, CliCommand, ProgressMode};
use qdt_core::RateLimit;

#[test]
fn test_cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn test_no_arguments_fails() {
    assert!(Cli::try_parse_from(["qdt-client"]).is_err());
}

#[test]
fn test_missing_filename_fails() {
    assert!(Cli::try_parse_from(["qdt-client", "127.0.0.1:4242", "get"]).is_err());
}

#[test]
fn test_unknown_command_fails() {
    assert!(Cli::try_parse_from(["qdt-client", "127.0.0.1:4242", "put", "x"]).is_err());
}

#[test]
fn test_invalid_limit_is_a_validation_error() {
    let err = Cli::try_parse_from(["qdt-client", "--limit", "10X", "h:1", "ls"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValueValidation);
}

#[test]
fn test_invalid_progress_mode_fails() {
    let err = Cli::try_parse_from(["qdt-client", "--progress", "fancy", "h:1", "ls"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn test_limit_suffixes() {
    let cases = [
        ("0", RateLimit::UNLIMITED),
        ("1024", RateLimit::bytes_per_second(1024)),
        ("2M", RateLimit::bytes_per_second(2 * 1024 * 1024)),
        ("1g", RateLimit::bytes_per_second(1 << 30)),
    ];
    for (arg, expected) in cases {
        let cli = Cli::try_parse_from(["qdt-client", "--limit", arg, "h:1", "ls"]).unwrap();
        assert_eq!(cli.limit, expected, "--limit {}", arg);
    }
}

#[test]
fn test_get_keeps_spaces_in_filename() {
    let cli = Cli::try_parse_from(["qdt-client", "h:1", "get", "my report.pdf"]).unwrap();
    match &cli.command {
        CliCommand::Get { filename, output } => {
            assert_eq!(filename, "my report.pdf");
            assert!(output.is_none());
        }
        other => panic!("expected get, got {:?}", other),
    }
    let command = cli.protocol_command().unwrap();
    assert_eq!(command.encode(), b"get my report.pdf\n");
}

#[test]
fn test_bad_cert_hash_is_reported_before_connecting() {
    let cli = Cli::try_parse_from(["qdt-client", "--cert-hash", "???", "h:1", "ls"]).unwrap();
    let err = cli.connection_config().unwrap_err();
    assert!(!err.is_fatal());
}

#[test]
fn test_defaults() {
    let cli = Cli::try_parse_from(["qdt-client", "h:1", "ls"]).unwrap();
    assert_eq!(cli.progress, ProgressMode::Plain);
    assert_eq!(cli.server_name, "localhost");
    assert_eq!(cli.connect_timeout, 10);
    assert_eq!(cli.verbose, 0);
    assert!(cli.transfer_options().limit.is_unlimited());
}
