//! Config file persistence

use gpsmux_core::config::ConfigError;
use gpsmux_core::{AppConfig, ReceiverFamily, SerialParity, SyncPair};

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = AppConfig::default();
    config.receiver.family = ReceiverFamily::Allystar;
    config.serial.port = "/dev/ttyUSB3".into();
    config.serial.parity = SerialParity::Even;
    config.decoder.max_sentence_len = 100;
    config.retry.max_attempts = 0;
    config.logging.json = true;
    config.save_to(&path).unwrap();

    let loaded = AppConfig::load_from(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.decoder_config().sync, SyncPair::ALLYSTAR);
    assert_eq!(loaded.decoder_config().max_sentence_len, 100);
}

#[test]
fn test_invalid_file_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[receiver]\nfamily = \"sirf\"\n").unwrap();

    assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse(_))));
}
