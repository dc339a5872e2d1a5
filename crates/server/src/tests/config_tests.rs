use super::*;

use std::{
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn file_values_override_defaults() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = env::temp_dir().join(format!("run_server_config_test_{suffix}"));
    fs::create_dir_all(&temp_root).expect("temp root");
    let path = temp_root.join("server.toml");
    fs::write(
        &path,
        "bind_addr = \"0.0.0.0:9000\"\nui_timeout_ms = 1500\nstep_delay_ms = 0\n",
    )
    .expect("write settings");

    let mut settings = Settings::default();
    apply_file(&mut settings, &path);
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.ui_timeout_ms, 1500);
    assert_eq!(settings.step_delay_ms, 0);

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn missing_file_keeps_defaults() {
    let mut settings = Settings::default();
    apply_file(&mut settings, Path::new("/definitely/not/here/server.toml"));
    assert_eq!(settings, Settings::default());
}

#[test]
fn app_prefixed_env_wins_over_plain_bind() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_from(&[
            ("SERVER_BIND", "127.0.0.1:1"),
            ("APP__BIND_ADDR", "127.0.0.1:2"),
            ("APP__UI_TIMEOUT_MS", "250"),
        ]),
    );
    assert_eq!(settings.server_bind, "127.0.0.1:2");
    assert_eq!(settings.ui_timeout_ms, 250);
    assert_eq!(settings.step_delay_ms, Settings::default().step_delay_ms);
}

#[test]
fn unparseable_numbers_are_ignored() {
    let mut settings = Settings::default();
    apply_env(&mut settings, env_from(&[("APP__STEP_DELAY_MS", "soon")]));
    assert_eq!(settings.step_delay_ms, 500);
}

#[test]
fn runner_settings_use_milliseconds() {
    let settings = Settings {
        ui_timeout_ms: 2_000,
        step_delay_ms: 10,
        ..Settings::default()
    };
    let runner = settings.runner();
    assert_eq!(runner.ui_timeout, Duration::from_secs(2));
    assert_eq!(runner.step_delay, Duration::from_millis(10));
}
