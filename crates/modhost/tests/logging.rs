//! File logging through the process-wide facility

use modhost::config::{LogFormat, LoggingConfig};
use modhost::logging;
use tracing::info;

#[test]
fn test_shutdown_flushes_every_line_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("modhost.log");

    let facility = logging::init(&LoggingConfig {
        level: "info".to_string(),
        format: LogFormat::Compact,
        file: Some(file.clone()),
    })
    .unwrap();
    assert!(facility.is_installed());
    assert!(facility.has_file_writer());

    for i in 0..2000 {
        info!("flushed line {}", i);
    }
    logging::shutdown();
    logging::shutdown();
    assert!(!facility.has_file_writer());

    let text = std::fs::read_to_string(&file).unwrap();
    let written = text.lines().filter(|l| l.contains("flushed line")).count();
    assert_eq!(written, 2000);
}
