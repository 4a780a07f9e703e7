use assert_cmd::Command;

pub fn habitd_bin() -> Command {
    #[allow(deprecated)]
    {
        Command::cargo_bin("habitd").expect("habitd test binary should build")
    }
}

/// Binary pointed at a config file inside `dir`, with a quiet log filter.
pub fn habitd_in(dir: &std::path::Path, config: &str) -> Command {
    let config_path = dir.join("config.toml");
    std::fs::write(&config_path, config).expect("write test config");
    let mut cmd = habitd_bin();
    cmd.current_dir(dir)
        .env("HABITD_CONFIG", &config_path)
        .env("RUST_LOG", "error");
    cmd
}
