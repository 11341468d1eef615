use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use depth_canvas::config::CanvasConfig;
use depth_canvas::MatchMethod;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CANVAS_CONFIG",
        "CANVAS_TEMPLATE_DIR",
        "CANVAS_SOURCE",
        "CANVAS_MQTT_BROKER",
        "CANVAS_MODULE_ID",
        "CANVAS_BYPASS_TRANSPORT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "roi": { "x0": 100, "y0": 80, "x1": 420, "y1": 300 },
        "templates": { "dir": "/srv/canvas/templates" },
        "matching": { "method": "hu_distance", "area_threshold": 3000.0 },
        "strokes": { "alpha": 0.25, "max_age": 8 },
        "background": { "bake": false },
        "transport": { "broker": "mqtt://table.local:1883", "topic_prefix": "sand" },
        "unknown_section": { "ignored": true }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("CANVAS_CONFIG", file.path());
    std::env::set_var("CANVAS_SOURCE", "replay:///captures/session-3");
    std::env::set_var("CANVAS_MODULE_ID", "7");
    std::env::set_var("CANVAS_BYPASS_TRANSPORT", "1");

    let cfg = CanvasConfig::load().expect("load config");

    assert_eq!((cfg.roi.width(), cfg.roi.height()), (320, 220));
    assert_eq!(cfg.template_dir.to_str(), Some("/srv/canvas/templates"));
    assert_eq!(cfg.matching.method, MatchMethod::HuDistance);
    assert_eq!(cfg.matching.area_threshold, 3000.0);
    assert_eq!(cfg.matching.small_area_threshold, 250.0);
    assert_eq!(cfg.strokes.alpha, 0.25);
    assert_eq!(cfg.strokes.max_age, 8);
    assert!(!cfg.background.bake);
    assert_eq!(cfg.transport.broker, "mqtt://table.local:1883");
    assert_eq!(cfg.transport.topic_prefix, "sand");
    assert_eq!(cfg.sensor.source, "replay:///captures/session-3");
    assert_eq!(cfg.transport.module_id, 7);
    assert!(cfg.transport.bypass);

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
[baseline]
n_profile = 20
removal_ratio = 0.75

[depth]
mask_threshold = 60

[sensor]
mirror = false
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = CanvasConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.baseline.n_profile, 20);
    assert_eq!(cfg.baseline.removal_ratio, 0.75);
    assert_eq!(cfg.depth.mask_threshold, 60);
    assert!(!cfg.sensor.mirror);
    assert_eq!(cfg.sensor.source, "stub://sandbox");

    clear_env();
}

#[test]
fn defaults_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = CanvasConfig::load().expect("load defaults");
    assert_eq!((cfg.roi.width(), cfg.roi.height()), (275, 175));
    assert_eq!(cfg.baseline.n_profile, 10);
    assert_eq!(cfg.clusters.min_points, 10);
    assert_eq!(cfg.matching.method, MatchMethod::ContourSimilarity);
    assert_eq!(cfg.transport.broker, "127.0.0.1:1883");
    assert!(!cfg.transport.bypass);
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut file,
        br#"{ "roi": { "x0": 200, "y0": 90, "x1": 100, "y1": 265 } }"#,
    )
    .expect("write config");
    let err = CanvasConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("roi"));

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "strokes": { "alpha": 0.0 } }"#)
        .expect("write config");
    assert!(CanvasConfig::load_from(Some(file.path())).is_err());

    std::env::set_var("CANVAS_MODULE_ID", "four");
    assert!(CanvasConfig::load().is_err());
    std::env::set_var("CANVAS_MODULE_ID", "4");
    std::env::set_var("CANVAS_BYPASS_TRANSPORT", "maybe");
    assert!(CanvasConfig::load().is_err());

    clear_env();
}
