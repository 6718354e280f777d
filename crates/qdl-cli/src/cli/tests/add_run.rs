//! Tests for add and run subcommands.

use super::parse;
use crate::cli::CliCommand;

#[test]
fn cli_parse_add() {
    match parse(&["qdl", "add", "https://example.com/file.iso"]) {
        CliCommand::Add {
            source,
            kind,
            dir,
            referrer,
            checksum,
            paused,
            batch,
        } => {
            assert_eq!(source, "https://example.com/file.iso");
            assert!(kind.is_none());
            assert!(dir.is_none());
            assert!(referrer.is_none());
            assert!(checksum.is_none());
            assert!(!paused);
            assert!(!batch);
        }
        _ => panic!("expected Add"),
    }
}

#[test]
fn cli_parse_add_dir_and_kind() {
    match parse(&[
        "qdl",
        "add",
        "https://example.com/x",
        "--dir",
        "/tmp",
        "--kind",
        "stream",
    ]) {
        CliCommand::Add { source, kind, dir, .. } => {
            assert_eq!(source, "https://example.com/x");
            assert_eq!(dir.as_deref(), Some("/tmp"));
            assert_eq!(kind.as_deref(), Some("stream"));
        }
        _ => panic!("expected Add with --dir --kind"),
    }
}

#[test]
fn cli_parse_add_paused_batch() {
    match parse(&[
        "qdl",
        "add",
        "https://example.com/part[01-09].bin",
        "--paused",
        "--batch",
    ]) {
        CliCommand::Add { paused, batch, .. } => {
            assert!(paused);
            assert!(batch);
        }
        _ => panic!("expected Add with --paused --batch"),
    }
}

#[test]
fn cli_parse_add_checksum_referrer() {
    match parse(&[
        "qdl",
        "add",
        "https://example.com/x",
        "--checksum",
        "deadbeef",
        "--referrer",
        "https://example.com/",
    ]) {
        CliCommand::Add {
            checksum, referrer, ..
        } => {
            assert_eq!(checksum.as_deref(), Some("deadbeef"));
            assert_eq!(referrer.as_deref(), Some("https://example.com/"));
        }
        _ => panic!("expected Add with --checksum --referrer"),
    }
}

#[test]
fn cli_parse_run() {
    match parse(&["qdl", "run"]) {
        CliCommand::Run => {}
        _ => panic!("expected Run"),
    }
}
