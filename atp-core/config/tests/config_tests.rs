//! 配置加载与线程隔离测试

use atp_config::*;
use std::fs;
use std::thread;

#[test]
fn test_save_and_load_each_format() {
    let dir = tempfile::tempdir().unwrap();

    let mut config = TestConfig::default();
    let mut device = DeviceSpec::new("10.10.0.5");
    device.default = true;
    device.root.password = Some("f5site02".to_string());
    config.devices.insert("bigiq-1".to_string(), device);
    config.wait.timeout = 42;

    for name in ["test.toml", "test.yaml", "test.json"] {
        let path = dir.path().join(name);
        config.save_to_file(&path).unwrap();

        let loaded = TestConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.wait.timeout, 42, "{}", name);
        assert_eq!(
            loaded.get_device(None).unwrap().root_creds(None).password,
            "f5site02"
        );
    }
}

#[test]
fn test_unsupported_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.ini");
    fs::write(&path, "x=1").unwrap();

    let err = TestConfig::load_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("不支持的配置文件格式"));
}

#[test]
fn test_invalid_content_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "devices: [unclosed").unwrap();

    let err = TestConfig::load_from_file(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("broken.yaml"));
}

#[test]
fn test_snapshots_are_isolated_between_threads() {
    let mut shared = TestConfig::default();
    shared
        .devices
        .insert("bigip-1".to_string(), DeviceSpec::new("10.0.0.1"));

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let snapshot = shared.clone();
            thread::spawn(move || {
                let _guard = install(snapshot);
                with_current_mut(|cfg| {
                    cfg.environment.mode = format!("thread-{}", i);
                    cfg.devices.get_mut("bigip-1").unwrap().ssh_port = 2200 + i;
                })
                .unwrap();
                thread::sleep(std::time::Duration::from_millis(20));
                current().unwrap()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let seen = handle.join().unwrap();
        assert_eq!(seen.environment.mode, format!("thread-{}", i));
        assert_eq!(seen.devices["bigip-1"].ssh_port, 2200 + i as u16);
    }

    assert_eq!(shared.environment.mode, "integration");
    assert_eq!(shared.devices["bigip-1"].ssh_port, 22);
    assert!(!is_installed());
}
