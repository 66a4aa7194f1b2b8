mod common;

use clap::Parser;
use std::path::Path;

use common::recording;
use speechscore::adapters::bundle::{pack, unpack, ManifestEntry};
use speechscore::adapters::sqlite::{initialize_database, SqliteRecordingRepository};
use speechscore::cli::commands::recording::RecordingCommands;
use speechscore::cli::commands::worker::WorkerCommands;
use speechscore::cli::{self, Cli, Commands};
use speechscore::domain::models::{BundleSource, Config, TaskType};
use speechscore::domain::ports::RecordingRepository;

#[test]
fn test_parse_worker_run() {
    let cli = Cli::try_parse_from([
        "speechscore",
        "--json",
        "worker",
        "run",
        "--once",
        "--interval-secs",
        "30",
        "--dry-run",
    ])
    .unwrap();

    assert!(cli.json);
    match cli.command {
        Commands::Worker(args) => {
            let WorkerCommands::Run { once, interval_secs, dry_run } = args.command;
            assert!(once);
            assert_eq!(interval_secs, Some(30));
            assert!(dry_run);
        }
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_recording_download() {
    let cli = Cli::try_parse_from([
        "speechscore",
        "recording",
        "download",
        "1001",
        "2",
        "clap-d",
        "PTK_SOUND",
        "4",
        "1",
        "--out",
        "ptk.wav",
        "--normalize",
        "--config",
        "alt.yaml",
    ])
    .unwrap();

    assert_eq!(cli.config.as_deref(), Some(Path::new("alt.yaml")));
    match cli.command {
        Commands::Recording(args) => {
            let RecordingCommands::Download { task_type, question_no, sub_attempt, normalize, .. } =
                args.command;
            assert_eq!(task_type, TaskType::Speech);
            assert_eq!(question_no, 4);
            assert_eq!(sub_attempt, 1);
            assert!(normalize);
        }
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_rejects_unknown_task_type() {
    let result = Cli::try_parse_from([
        "speechscore", "recording", "download", "1001", "2", "CLAP-Z", "X", "0", "0", "--out", "x.wav",
    ]);
    assert!(result.is_err());
}

async fn run(args: &[&str], config: &Config) {
    let mut argv = vec!["speechscore", "--json"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    cli::run(cli, config.clone()).await.unwrap();
}

#[tokio::test]
async fn test_import_score_export_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.database.path = dir.path().join("db/speechscore.db").display().to_string();
    config.bundle.source = BundleSource::Store;

    let entries: Vec<_> = [
        (TaskType::Language, "SAY_ANI", 0),
        (TaskType::Language, "GUESS_END", 0),
        (TaskType::Language, "GUESS_END", 1),
    ]
    .into_iter()
    .map(|(task_type, code, qno)| {
        let rec = recording("3003", 1, task_type, code, qno, 0);
        (ManifestEntry::for_meta(&rec.meta), rec.audio)
    })
    .collect();
    let archive = dir.path().join("upload.tar.gz");
    std::fs::write(&archive, pack(&entries, Vec::new()).unwrap()).unwrap();

    run(&["bundle", "import", archive.to_str().unwrap()], &config).await;

    let repo = SqliteRecordingRepository::new(initialize_database(&config.database).await.unwrap());
    let jobs = repo.list_pending_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].access_token.is_some(), "import issues the patient token");

    run(&["worker", "run", "--once", "--dry-run"], &config).await;
    assert!(repo.list_pending_jobs().await.unwrap().is_empty());
    assert_eq!(repo.list_scores("3003", 1).await.unwrap().len(), 3);

    let exported = dir.path().join("export.tar.gz");
    run(&["bundle", "export", "3003", "1", "--out", exported.to_str().unwrap()], &config).await;
    let unpacked = tempfile::tempdir().unwrap();
    let recordings = unpack(&exported, unpacked.path(), Some(("3003", 1))).unwrap();
    assert_eq!(recordings.len(), 3);

    run(&["scores", "clear", "3003", "1"], &config).await;
    assert!(repo.list_scores("3003", 1).await.unwrap().is_empty());
    assert_eq!(repo.list_pending_jobs().await.unwrap().len(), 1);
}
